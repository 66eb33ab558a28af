use std::sync::RwLock;

use super::{AuditEntry, AuditError, AuditRepository};

/// Process-local audit log, for tests and the in-memory deployment.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AuditError {
    AuditError::Backend("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl AuditRepository for InMemoryAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.write().map_err(|_| poisoned())?.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditContext};

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let log = InMemoryAuditLog::new();
        for id in ["a", "b", "c"] {
            let entry = AuditEntry::new(&AuditContext::system(), AuditAction::Create, "role", id, serde_json::json!({}));
            log.record(&entry).await.unwrap();
        }

        let recent = log.recent(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|e| e.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(log.len(), 3);
    }
}
