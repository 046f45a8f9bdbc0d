//! PostgreSQL stores.
//!
//! Enum columns are stored as constrained `TEXT` and permission sets as
//! `TEXT[]`; rows are decoded through private `FromRow` structs and parsed
//! into domain models here.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, RoleStore, SessionStore, StoreError, StoreResult};
use crate::models::{
    Credential, CredentialPatch, NewCredential, NewRole, NewSession, Role, RoleLevel, RolePatch,
    Session, SessionStatus, UnknownVariant,
};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            // e.g. removing a role that credentials still reference
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Unknown(other.to_string()),
        }
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(e: UnknownVariant) -> Self {
        StoreError::Unknown(format!("corrupt row: {e}"))
    }
}

/// One pool backing all three store contracts.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Credentials
// =============================================================================

const CREDENTIAL_COLUMNS: &str = "id, subject_ref, email, name, password_hash, role_id, \
     permissions, provider, status, login_attempts, locked_until, last_login_at, \
     password_changed_at, email_verified_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    subject_ref: Uuid,
    email: String,
    name: String,
    password_hash: Option<String>,
    role_id: Uuid,
    permissions: Vec<String>,
    provider: String,
    status: String,
    login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    password_changed_at: Option<DateTime<Utc>>,
    email_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        Ok(Credential {
            id: row.id,
            subject_ref: row.subject_ref,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role_id: row.role_id,
            permissions: row.permissions.into_iter().collect(),
            provider: row.provider.parse()?,
            status: row.status.parse()?,
            login_attempts: u32::try_from(row.login_attempts).unwrap_or(0),
            locked_until: row.locked_until,
            last_login_at: row.last_login_at,
            password_changed_at: row.password_changed_at,
            email_verified_at: row.email_verified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_array(set: BTreeSet<String>) -> Vec<String> {
    set.into_iter().collect()
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Credential::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1");
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Credential::try_from).transpose()
    }

    async fn create(&self, record: NewCredential) -> StoreResult<Credential> {
        let sql = format!(
            "INSERT INTO credentials \
               (id, subject_ref, email, name, password_hash, role_id, provider, status, password_changed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CASE WHEN $5::text IS NULL THEN NULL ELSE now() END) \
             RETURNING {CREDENTIAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(record.subject_ref)
            .bind(&record.email)
            .bind(&record.name)
            .bind(&record.password_hash)
            .bind(record.role_id)
            .bind(record.provider.as_str())
            .bind(record.status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Credential::try_from(row)
    }

    async fn update(&self, id: Uuid, patch: CredentialPatch) -> StoreResult<Credential> {
        let sql = format!(
            "UPDATE credentials SET \
               permissions    = COALESCE($2::text[], permissions), \
               status         = COALESCE($3::text, status), \
               login_attempts = COALESCE($4::int4, login_attempts), \
               locked_until   = CASE WHEN $5::bool THEN $6::timestamptz ELSE locked_until END, \
               last_login_at  = COALESCE($7::timestamptz, last_login_at), \
               updated_at     = now() \
             WHERE id = $1 \
             RETURNING {CREDENTIAL_COLUMNS}"
        );
        let attempts = patch
            .login_attempts
            .map(|n| i32::try_from(n).unwrap_or(i32::MAX));
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(id)
            .bind(patch.permissions.map(to_array))
            .bind(patch.status.map(|s| s.as_str()))
            .bind(attempts)
            .bind(patch.locked_until.is_some())
            .bind(patch.locked_until.flatten())
            .bind(patch.last_login_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Credential::try_from(row)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> StoreResult<Credential> {
        // Single statement: the row lock serializes concurrent increments.
        let sql = format!(
            "UPDATE credentials SET \
               login_attempts = CASE WHEN $2::int4 > 0 AND login_attempts + 1 >= $2::int4 \
                                     THEN 0 ELSE login_attempts + 1 END, \
               locked_until   = CASE WHEN $2::int4 > 0 AND login_attempts + 1 >= $2::int4 \
                                     THEN $3::timestamptz ELSE locked_until END, \
               updated_at     = now() \
             WHERE id = $1 \
             RETURNING {CREDENTIAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(id)
            .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
            .bind(lock_until)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Credential::try_from(row)
    }
}

// =============================================================================
// Roles
// =============================================================================

const ROLE_COLUMNS: &str =
    "id, name, level, permissions, is_active, description, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    level: String,
    permissions: Vec<String>,
    is_active: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoleRow> for Role {
    type Error = StoreError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            id: row.id,
            name: row.name,
            level: row.level.parse()?,
            permissions: row.permissions.into_iter().collect(),
            is_active: row.is_active,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_roles(rows: Vec<RoleRow>) -> StoreResult<Vec<Role>> {
    rows.into_iter().map(Role::try_from).collect()
}

#[async_trait]
impl RoleStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Role::try_from).transpose()
    }

    async fn find_by_level(&self, level: RoleLevel) -> StoreResult<Vec<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE level = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(level.as_str())
            .fetch_all(&self.pool)
            .await?;
        to_roles(rows)
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1");
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Role::try_from).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles \
             ORDER BY CASE level \
               WHEN 'user' THEN 0 WHEN 'moderator' THEN 1 \
               WHEN 'admin' THEN 2 ELSE 3 END, name"
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        to_roles(rows)
    }

    async fn create(&self, role: NewRole) -> StoreResult<Role> {
        let sql = format!(
            "INSERT INTO roles (id, name, level, permissions, description) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ROLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(&role.name)
            .bind(role.level.as_str())
            .bind(to_array(role.permissions))
            .bind(&role.description)
            .fetch_one(&self.pool)
            .await?;
        Role::try_from(row)
    }

    async fn update(&self, id: Uuid, patch: RolePatch) -> StoreResult<Role> {
        let sql = format!(
            "UPDATE roles SET \
               name        = COALESCE($2::text, name), \
               level       = COALESCE($3::text, level), \
               permissions = COALESCE($4::text[], permissions), \
               is_active   = COALESCE($5::bool, is_active), \
               description = CASE WHEN $6::bool THEN $7::text ELSE description END, \
               updated_at  = now() \
             WHERE id = $1 \
             RETURNING {ROLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(id)
            .bind(patch.name)
            .bind(patch.level.map(|l| l.as_str()))
            .bind(patch.permissions.map(to_array))
            .bind(patch.is_active)
            .bind(patch.description.is_some())
            .bind(patch.description.flatten())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Role::try_from(row)
    }

    async fn remove(&self, id: Uuid) -> StoreResult<Role> {
        let sql = format!("DELETE FROM roles WHERE id = $1 RETURNING {ROLE_COLUMNS}");
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Role::try_from(row)
    }
}

// =============================================================================
// Sessions
// =============================================================================

const SESSION_COLUMNS: &str = "id, credential_id, token_hash, expires_at, status, user_agent, \
     ip_address, last_activity_at, created_at";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    credential_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    status: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    last_activity_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            credential_id: row.credential_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            status: row.status.parse::<SessionStatus>()?,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, session: NewSession) -> StoreResult<Session> {
        let sql = format!(
            "INSERT INTO sessions (id, credential_id, token_hash, expires_at, user_agent, ip_address, last_activity_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(session.credential_id)
            .bind(&session.token_hash)
            .bind(session.expires_at)
            .bind(&session.user_agent)
            .bind(&session.ip_address)
            .fetch_one(&self.pool)
            .await?;
        Session::try_from(row)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::try_from).transpose()
    }

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> StoreResult<Session> {
        let sql = format!(
            "UPDATE sessions SET status = $2, last_activity_at = now() \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Session::try_from(row)
    }

    async fn revoke_if_active(&self, id: Uuid) -> StoreResult<bool> {
        let revoked = sqlx::query_scalar::<_, Uuid>(
            "UPDATE sessions SET status = $2, last_activity_at = now() \
             WHERE id = $1 AND status = $3 \
             RETURNING id",
        )
        .bind(id)
        .bind(SessionStatus::Revoked.as_str())
        .bind(SessionStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(revoked.is_some())
    }

    async fn list_for_credential(&self, credential_id: Uuid) -> StoreResult<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE credential_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(credential_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Session::try_from).collect()
    }
}
