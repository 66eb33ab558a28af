//! `sys_audit_log` adapter sharing the directory's connection pool.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use gatehouse_core::UserId;

use super::{AuditAction, AuditEntry, AuditError, AuditRepository};

#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: Arc<PgPool>,
}

impl PostgresAuditLog {
    /// The table is created by the directory schema.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AuditError {
    AuditError::Backend(format!("sqlx error in {operation}: {err}"))
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, sqlx::Error> {
    let raw_action: String = row.try_get("action")?;
    let action = AuditAction::parse(&raw_action).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "action".to_string(),
        source: format!("unknown audit action '{raw_action}'").into(),
    })?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        actor_id: row.try_get::<Option<Uuid>, _>("actor_id")?.map(UserId::from),
        action,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        metadata: row.try_get("metadata")?,
        ip: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl AuditRepository for PostgresAuditLog {
    #[instrument(skip(self, entry), fields(action = %entry.action, resource_id = %entry.resource_id), err)]
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO sys_audit_log
                (id, actor_id, action, resource_type, resource_id, metadata, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id.map(Uuid::from))
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.metadata)
        .bind(entry.ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record", e))?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, resource_type, resource_id, metadata, ip_address, user_agent, created_at
            FROM sys_audit_log
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent", e))?;

        rows.iter()
            .map(entry_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("recent", e))
    }
}
