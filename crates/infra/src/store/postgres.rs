//! Postgres-backed directory of users, credentials and roles.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate username, email, token or role name |
//! | Database (foreign key violation) | `23503` | `Conflict` | Role still assigned, or assignment to a missing role |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / network / decode | N/A | `Backend` | Infrastructure failure |
//!
//! Writes touching more than one table run in a single transaction.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use gatehouse_auth::{Credential, Permission, Role, User};
use gatehouse_core::{RoleId, UserId};

use super::{Page, RoleFilter, RoleStore, StoreError, UserFilter, UserStore};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const USER_SELECT: &str = r#"
    SELECT
        u.id,
        u.name,
        u.username,
        u.email,
        u.created_at,
        u.updated_at,
        a.status,
        a.password,
        a.token,
        a.updated_at AS auth_updated_at
    FROM usr_user u
    JOIN usr_auth a ON a.user_id = u.id
"#;

const USER_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR u.name ILIKE $1 OR u.username ILIKE $1 OR u.email ILIKE $1)
      AND ($2::bool IS NULL OR a.status = $2)
      AND ($3::uuid IS NULL OR EXISTS (
            SELECT 1 FROM usr_user_role ur WHERE ur.user_id = u.id AND ur.role_id = $3))
"#;

const ROLE_SELECT: &str =
    "SELECT id, name, permissions, enabled, created_at, updated_at FROM usr_role";

/// Postgres-backed [`UserStore`] and [`RoleStore`].
///
/// Uses the SQLx connection pool, which is `Send + Sync` and shared by clones.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Shared pool, for adapters living next to the directory.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Apply the bundled schema. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_one_user(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<User>, StoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Decode user rows and attach their roles in one extra query.
    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<User>, StoreError> {
        let mut users = rows.iter().map(user_from_row).collect::<Result<Vec<_>, _>>()?;
        if users.is_empty() {
            return Ok(users);
        }

        let ids: Vec<Uuid> = users.iter().map(|u| *u.id.as_uuid()).collect();
        let role_rows = sqlx::query(
            r#"
            SELECT ur.user_id, r.id, r.name, r.permissions, r.enabled, r.created_at, r.updated_at
            FROM usr_user_role ur
            JOIN usr_role r ON r.id = ur.role_id
            WHERE ur.user_id = ANY($1)
            ORDER BY r.name ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_user_roles", e))?;

        let mut by_user: HashMap<Uuid, Vec<Role>> = HashMap::new();
        for row in &role_rows {
            let user_id: Uuid = col(row, "user_id")?;
            by_user.entry(user_id).or_default().push(role_from_row(row)?);
        }
        for user in &mut users {
            user.roles = by_user.remove(user.id.as_uuid()).unwrap_or_default();
        }
        Ok(users)
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresDirectory {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1");
        self.fetch_one_user("find_user_by_id", sqlx::query(&sql).bind(*id.as_uuid()))
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("{USER_SELECT} WHERE u.username = $1");
        self.fetch_one_user("find_user_by_username", sqlx::query(&sql).bind(username))
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("{USER_SELECT} WHERE u.email = $1");
        self.fetch_one_user("find_user_by_email", sqlx::query(&sql).bind(email))
            .await
    }

    #[instrument(skip_all, err)]
    async fn find_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("{USER_SELECT} WHERE a.token = $1");
        self.fetch_one_user("find_user_by_token", sqlx::query(&sql).bind(token))
            .await
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: &UserFilter) -> Result<Page<User>, StoreError> {
        let search = like_pattern(filter.search.as_deref());
        let role_id = filter.role_id.map(|id| *id.as_uuid());

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM usr_user u JOIN usr_auth a ON a.user_id = u.id {USER_FILTER}"
        );
        let total: i64 = sqlx::query(&count_sql)
            .bind(&search)
            .bind(filter.status)
            .bind(role_id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))
            .and_then(|row| col(&row, "total"))?;

        let sql = format!("{USER_SELECT} {USER_FILTER} ORDER BY u.name ASC, u.id ASC LIMIT $4 OFFSET $5");
        let rows = sqlx::query(&sql)
            .bind(&search)
            .bind(filter.status)
            .bind(role_id)
            .bind(limit_param(filter.pagination.limit))
            .bind(filter.pagination.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;

        let users = self.hydrate(rows).await?;
        Ok(Page::new(users, filter.pagination, total as u64))
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query(
            r#"
            INSERT INTO usr_user (id, name, username, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        sqlx::query(
            r#"
            INSERT INTO usr_auth (user_id, status, password, token, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(user.credential.status)
        .bind(&user.credential.password_hash)
        .bind(&user.credential.token)
        .bind(user.credential.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_auth", e))?;

        insert_assignments(&mut tx, user).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip_all, fields(user_id = %user.id), err)]
    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE usr_user SET name = $2, username = $3, email = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE usr_auth SET status = $2, password = $3, token = $4, updated_at = $5
            WHERE user_id = $1
            "#,
        )
        .bind(*user.id.as_uuid())
        .bind(user.credential.status)
        .bind(&user.credential.password_hash)
        .bind(&user.credential.token)
        .bind(user.credential.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_auth", e))?;

        sqlx::query("DELETE FROM usr_user_role WHERE user_id = $1")
            .bind(*user.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_assignments", e))?;
        insert_assignments(&mut tx, user).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, ids: &[UserId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM usr_user WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_users", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgresDirectory {
    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let sql = format!("{ROLE_SELECT} WHERE id = $1");
        sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_id", e))?
            .map(|row| role_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let sql = format!("{ROLE_SELECT} WHERE name = $1");
        sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?
            .map(|row| role_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!("{ROLE_SELECT} WHERE id = ANY($1) ORDER BY name ASC");
        sqlx::query(&sql)
            .bind(&ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_roles_by_ids", e))?
            .iter()
            .map(role_from_row)
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: &RoleFilter) -> Result<Page<Role>, StoreError> {
        let search = like_pattern(filter.search.as_deref());
        const ROLE_FILTER: &str =
            "WHERE ($1::text IS NULL OR name ILIKE $1) AND ($2::bool IS NULL OR enabled = $2)";

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM usr_role {ROLE_FILTER}"))
            .bind(&search)
            .bind(filter.enabled)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_roles", e))
            .and_then(|row| col(&row, "total"))?;

        let sql = format!("{ROLE_SELECT} {ROLE_FILTER} ORDER BY name ASC, id ASC LIMIT $3 OFFSET $4");
        let roles = sqlx::query(&sql)
            .bind(&search)
            .bind(filter.enabled)
            .bind(limit_param(filter.pagination.limit))
            .bind(filter.pagination.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?
            .iter()
            .map(role_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(roles, filter.pagination, total as u64))
    }

    #[instrument(skip_all, fields(role_id = %role.id), err)]
    async fn create(&self, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usr_role (id, name, permissions, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*role.id.as_uuid())
        .bind(&role.name)
        .bind(permission_strings(role))
        .bind(role.enabled)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(role_id = %role.id), err)]
    async fn update(&self, role: &Role) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE usr_role SET name = $2, permissions = $3, enabled = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*role.id.as_uuid())
        .bind(&role.name)
        .bind(permission_strings(role))
        .bind(role.enabled)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, ids: &[RoleId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM usr_role WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_roles", e))?;
        Ok(result.rows_affected())
    }
}

async fn insert_assignments(
    tx: &mut Transaction<'_, Postgres>,
    user: &User,
) -> Result<(), StoreError> {
    for role in &user.roles {
        sqlx::query(
            "INSERT INTO usr_user_role (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(*user.id.as_uuid())
        .bind(*role.id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;
    }
    Ok(())
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {name}: {e}")))
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let id: Uuid = col(row, "id")?;
    Ok(User {
        id: UserId::from_uuid(id),
        name: col(row, "name")?,
        username: col(row, "username")?,
        email: col(row, "email")?,
        credential: Credential {
            status: col(row, "status")?,
            password_hash: col(row, "password")?,
            token: col(row, "token")?,
            updated_at: col(row, "auth_updated_at")?,
        },
        roles: Vec::new(),
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let id: Uuid = col(row, "id")?;
    let permissions: Vec<String> = col(row, "permissions")?;
    Ok(Role {
        id: RoleId::from_uuid(id),
        name: col(row, "name")?,
        permissions: permissions.into_iter().map(Permission::from).collect(),
        enabled: col(row, "enabled")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn permission_strings(role: &Role) -> Vec<String> {
    role.permissions.iter().map(|p| p.as_str().to_string()).collect()
}

/// `%needle%` with LIKE metacharacters escaped; `None` for an empty search.
fn like_pattern(search: Option<&str>) -> Option<String> {
    let needle = search.map(str::trim).filter(|s| !s.is_empty())?;
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

/// `LIMIT NULL` is unbounded in Postgres.
fn limit_param(limit: u32) -> Option<i64> {
    (limit > 0).then_some(i64::from(limit))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(duplicate_message(db_err.constraint())),
                Some("23503") => StoreError::Conflict("record is still referenced".to_string()),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn duplicate_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(c) if c.contains("username") => "username already exists".to_string(),
        Some(c) if c.contains("email") => "email already exists".to_string(),
        Some(c) if c.contains("token") => "session token already exists".to_string(),
        Some(c) if c.contains("name") => "name already exists".to_string(),
        _ => "duplicate record".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern(Some(" 50%_off ")), Some("%50\\%\\_off%".to_string()));
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(None), None);
    }

    #[test]
    fn zero_limit_is_unbounded() {
        assert_eq!(limit_param(0), None);
        assert_eq!(limit_param(25), Some(25));
    }

    #[test]
    fn duplicate_messages_name_the_field() {
        assert_eq!(duplicate_message(Some("usr_user_email_key")), "email already exists");
        assert_eq!(duplicate_message(Some("usr_role_name_key")), "name already exists");
        assert_eq!(duplicate_message(None), "duplicate record");
    }
}
