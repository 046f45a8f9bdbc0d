//! In-memory stores.
//!
//! Each store keeps its records behind one `RwLock`, so a uniqueness check
//! and the insert it guards happen under the same write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, RoleStore, SessionStore, StoreError, StoreResult};
use crate::models::{
    Credential, CredentialPatch, NewCredential, NewRole, NewSession, Role, RoleLevel, RolePatch,
    Session, SessionStatus,
};

// =============================================================================
// Credentials
// =============================================================================

#[derive(Default)]
struct CredentialTable {
    by_id: HashMap<Uuid, Credential>,
    /// Lowercased email → id.
    by_email: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    table: RwLock<CredentialTable>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
        let table = self.table.read().await;
        Ok(table
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>> {
        Ok(self.table.read().await.by_id.get(&id).cloned())
    }

    async fn create(&self, record: NewCredential) -> StoreResult<Credential> {
        let mut table = self.table.write().await;
        let key = record.email.to_lowercase();
        if table.by_email.contains_key(&key) {
            return Err(StoreError::Conflict(format!("email {key} already exists")));
        }
        if table
            .by_id
            .values()
            .any(|c| c.subject_ref == record.subject_ref)
        {
            return Err(StoreError::Conflict(format!(
                "subject {} already has a credential",
                record.subject_ref
            )));
        }

        let now = Utc::now();
        let password_changed_at = record.password_hash.as_ref().map(|_| now);
        let credential = Credential {
            id: Uuid::now_v7(),
            subject_ref: record.subject_ref,
            email: record.email,
            name: record.name,
            password_hash: record.password_hash,
            role_id: record.role_id,
            permissions: Default::default(),
            provider: record.provider,
            status: record.status,
            login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            password_changed_at,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        table.by_email.insert(key, credential.id);
        table.by_id.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn update(&self, id: Uuid, patch: CredentialPatch) -> StoreResult<Credential> {
        let mut table = self.table.write().await;
        let credential = table.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(permissions) = patch.permissions {
            credential.permissions = permissions;
        }
        if let Some(status) = patch.status {
            credential.status = status;
        }
        if let Some(attempts) = patch.login_attempts {
            credential.login_attempts = attempts;
        }
        if let Some(locked_until) = patch.locked_until {
            credential.locked_until = locked_until;
        }
        if let Some(at) = patch.last_login_at {
            credential.last_login_at = Some(at);
        }
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> StoreResult<Credential> {
        let mut table = self.table.write().await;
        let credential = table.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        let attempts = credential.login_attempts.saturating_add(1);
        if max_attempts > 0 && attempts >= max_attempts {
            credential.login_attempts = 0;
            credential.locked_until = Some(lock_until);
        } else {
            credential.login_attempts = attempts;
        }
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }
}

// =============================================================================
// Roles
// =============================================================================

#[derive(Default)]
pub struct MemoryRoleStore {
    roles: RwLock<HashMap<Uuid, Role>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.roles.read().await.get(&id).cloned())
    }

    async fn find_by_level(&self, level: RoleLevel) -> StoreResult<Vec<Role>> {
        let roles = self.roles.read().await;
        let mut found: Vec<Role> = roles.values().filter(|r| r.level == level).cloned().collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let mut all: Vec<Role> = self.roles.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        Ok(all)
    }

    async fn create(&self, role: NewRole) -> StoreResult<Role> {
        let mut roles = self.roles.write().await;
        if roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Conflict(format!("role {} already exists", role.name)));
        }
        let now = Utc::now();
        let created = Role {
            id: Uuid::now_v7(),
            name: role.name,
            level: role.level,
            permissions: role.permissions,
            is_active: true,
            description: role.description,
            created_at: now,
            updated_at: now,
        };
        roles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, patch: RolePatch) -> StoreResult<Role> {
        let mut roles = self.roles.write().await;
        if let Some(name) = &patch.name
            && roles.values().any(|r| r.id != id && &r.name == name)
        {
            return Err(StoreError::Conflict(format!("role {name} already exists")));
        }
        let role = roles.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = patch.name {
            role.name = name;
        }
        if let Some(level) = patch.level {
            role.level = level;
        }
        if let Some(permissions) = patch.permissions {
            role.permissions = permissions;
        }
        if let Some(is_active) = patch.is_active {
            role.is_active = is_active;
        }
        if let Some(description) = patch.description {
            role.description = description;
        }
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn remove(&self, id: Uuid) -> StoreResult<Role> {
        self.roles
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound)
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewSession) -> StoreResult<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.values().any(|s| s.token_hash == session.token_hash) {
            return Err(StoreError::Conflict("session token already recorded".into()));
        }
        let now = Utc::now();
        let created = Session {
            id: Uuid::now_v7(),
            credential_id: session.credential_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            status: SessionStatus::Active,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            last_activity_at: Some(now),
            created_at: now,
        };
        sessions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> StoreResult<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.status = status;
        session.last_activity_at = Some(Utc::now());
        Ok(session.clone())
    }

    async fn revoke_if_active(&self, id: Uuid) -> StoreResult<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Revoked;
                session.last_activity_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_credential(&self, credential_id: Uuid) -> StoreResult<Vec<Session>> {
        let mut found: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.credential_id == credential_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }
}
