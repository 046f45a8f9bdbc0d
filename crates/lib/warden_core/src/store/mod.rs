//! Store contracts for credentials, roles and sessions.
//!
//! Every adapter translates its backend's failures into the closed
//! [`StoreError`] set at its own boundary; nothing above this module ever
//! inspects a driver error.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Credential, CredentialPatch, NewCredential, NewRole, NewSession, Role, RoleLevel, RolePatch,
    Session, SessionStatus,
};

/// Store-boundary errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("store error: {0}")]
    Unknown(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persists one credential per principal. `create` reports a duplicate
/// email as [`StoreError::Conflict`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>>;

    async fn create(&self, record: NewCredential) -> StoreResult<Credential>;

    /// Apply `patch`, returning the updated record or [`StoreError::NotFound`].
    async fn update(&self, id: Uuid, patch: CredentialPatch) -> StoreResult<Credential>;

    /// Count one failed login in a single atomic step. When the count
    /// reaches `max_attempts` (non-zero) the credential is locked until
    /// `lock_until` and the counter resets to zero.
    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> StoreResult<Credential>;
}

/// Persists named roles. Read-mostly from the engine's perspective.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>>;

    async fn find_by_level(&self, level: RoleLevel) -> StoreResult<Vec<Role>>;

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    async fn list(&self) -> StoreResult<Vec<Role>>;

    async fn create(&self, role: NewRole) -> StoreResult<Role>;

    async fn update(&self, id: Uuid, patch: RolePatch) -> StoreResult<Role>;

    /// Delete and return the role, or [`StoreError::NotFound`].
    async fn remove(&self, id: Uuid) -> StoreResult<Role>;
}

/// Ledger of issued refresh tokens, keyed by token fingerprint.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: NewSession) -> StoreResult<Session>;

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;

    /// Set `status` and bump `last_activity_at`.
    async fn set_status(&self, id: Uuid, status: SessionStatus) -> StoreResult<Session>;

    /// Revoke the session only if it is still active. Returns whether this
    /// call performed the transition.
    async fn revoke_if_active(&self, id: Uuid) -> StoreResult<bool>;

    /// Newest first.
    async fn list_for_credential(&self, credential_id: Uuid) -> StoreResult<Vec<Session>>;
}

/// The three stores the engine is composed from.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub roles: Arc<dyn RoleStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    /// Process-local stores, for tests and single-node development.
    pub fn in_memory() -> Self {
        Self {
            credentials: Arc::new(memory::MemoryCredentialStore::new()),
            roles: Arc::new(memory::MemoryRoleStore::new()),
            sessions: Arc::new(memory::MemorySessionStore::new()),
        }
    }

    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            credentials: store.clone(),
            roles: store.clone(),
            sessions: store,
        }
    }
}

/// Bound a store call by `deadline`; an elapsed deadline becomes [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .unwrap_or(Err(StoreError::Timeout))
}
