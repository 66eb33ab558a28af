//! Audit trail of user and role writes.
//!
//! Every create, update and delete performed through the management use
//! cases leaves an [`AuditEntry`]. Recording is fire-and-forget: the
//! [`Auditor`] writes on its own task under a timeout, and a failed or slow
//! audit backend never fails or delays the write it describes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use gatehouse_core::UserId;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAuditLog;
pub use postgres::PostgresAuditLog;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit backend error: {0}")]
    Backend(String),
}

/// Who asked for a write, and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    /// `None` for writes made by the system itself.
    pub actor: Option<UserId>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn actor(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(AuditAction::Create),
            "update" => Some(AuditAction::Update),
            "delete" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded write.
///
/// `metadata` carries the accepted input, never secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<UserId>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        context: &AuditContext,
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor_id: context.actor,
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            metadata,
            ip: context.ip.clone(),
            user_agent: context.user_agent.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only audit storage.
#[async_trait::async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, AuditError>;
}

#[async_trait::async_trait]
impl<R> AuditRepository for Arc<R>
where
    R: AuditRepository + ?Sized,
{
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        (**self).record(entry).await
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        (**self).recent(limit).await
    }
}

const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(5);

/// Detached writer in front of an [`AuditRepository`].
#[derive(Clone)]
pub struct Auditor {
    repo: Arc<dyn AuditRepository>,
    timeout: Duration,
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

impl Auditor {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self {
            repo,
            timeout: DEFAULT_RECORD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record `entry` on a spawned task. Failures are logged and dropped.
    ///
    /// The handle is only useful to tests; callers normally ignore it.
    pub fn record(&self, entry: AuditEntry) -> JoinHandle<()> {
        let repo = self.repo.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, repo.record(&entry)).await {
                Ok(Ok(())) => debug!(
                    action = %entry.action,
                    resource_type = %entry.resource_type,
                    resource_id = %entry.resource_id,
                    "audit entry recorded"
                ),
                Ok(Err(e)) => warn!(
                    action = %entry.action,
                    resource_id = %entry.resource_id,
                    error = %e,
                    "audit write failed"
                ),
                Err(_) => warn!(
                    action = %entry.action,
                    resource_id = %entry.resource_id,
                    "audit write timed out"
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait::async_trait]
    impl AuditRepository for Stalled {
        async fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            std::future::pending().await
        }

        async fn recent(&self, _limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn entry_carries_request_context() {
        let actor = UserId::new();
        let ctx = AuditContext::actor(actor).with_ip("10.0.0.7").with_user_agent("curl/8");
        let entry = AuditEntry::new(&ctx, AuditAction::Delete, "role", "r-1", serde_json::json!({}));

        assert_eq!(entry.actor_id, Some(actor));
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(entry.action.to_string(), "delete");
    }

    #[tokio::test]
    async fn recorded_entries_reach_the_repository() {
        let log = Arc::new(InMemoryAuditLog::new());
        let auditor = Auditor::new(log.clone());
        let entry = AuditEntry::new(
            &AuditContext::system(),
            AuditAction::Create,
            "user",
            "u-1",
            serde_json::json!({ "username": "ada" }),
        );

        auditor.record(entry.clone()).await.unwrap();
        assert_eq!(log.recent(10).await.unwrap(), vec![entry]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_repository_is_abandoned_after_the_timeout() {
        let auditor = Auditor::new(Arc::new(Stalled)).with_timeout(Duration::from_secs(5));
        let entry = AuditEntry::new(&AuditContext::system(), AuditAction::Update, "user", "u-2", serde_json::json!({}));

        let started = tokio::time::Instant::now();
        auditor.record(entry).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn actions_parse_back() {
        for action in [AuditAction::Create, AuditAction::Update, AuditAction::Delete] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("rename"), None);
    }
}
