//! Role administration and default-role resolution.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use super::validation::normalize_permissions;
use super::{AuthError, AuthResult};
use crate::models::{NewRole, Role, RoleLevel, RolePatch};
use crate::store::{RoleStore, StoreError, with_deadline};

/// Roles provisioned by [`RoleService::seed_defaults`], lowest level first.
/// Each level inherits the permissions of the levels below it.
const DEFAULT_ROLES: &[(&str, RoleLevel, &[&str], &str)] = &[
    (
        "user",
        RoleLevel::User,
        &["read:self", "update:self"],
        "Default role for new credentials",
    ),
    (
        "moderator",
        RoleLevel::Moderator,
        &["read:users", "moderate:content"],
        "Content moderation",
    ),
    (
        "admin",
        RoleLevel::Admin,
        &["write:users", "read:roles", "manage:permissions"],
        "User and permission administration",
    ),
    (
        "super_admin",
        RoleLevel::SuperAdmin,
        &["manage:roles", "delete:users"],
        "Unrestricted administration",
    ),
];

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    deadline: Duration,
}

impl RoleService {
    pub fn new(roles: Arc<dyn RoleStore>, deadline: Duration) -> Self {
        Self { roles, deadline }
    }

    /// The single `user`-level role new credentials are assigned.
    ///
    /// Zero or several such roles is a deployment fault, reported as
    /// [`AuthError::Configuration`].
    pub async fn default_role(&self) -> AuthResult<Role> {
        let mut found =
            with_deadline(self.deadline, self.roles.find_by_level(RoleLevel::User)).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(AuthError::Configuration(
                "no default role (level=user) is provisioned".into(),
            )),
            n => Err(AuthError::Configuration(format!(
                "{n} roles have level=user; exactly one default role is required"
            ))),
        }
    }

    pub async fn list(&self) -> AuthResult<Vec<Role>> {
        Ok(with_deadline(self.deadline, self.roles.list()).await?)
    }

    pub async fn find(&self, id: Uuid) -> AuthResult<Role> {
        with_deadline(self.deadline, self.roles.find_by_id(id))
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("Role with ID {id} not found")))
    }

    pub async fn find_by_name(&self, name: &str) -> AuthResult<Option<Role>> {
        Ok(with_deadline(self.deadline, self.roles.find_by_name(name)).await?)
    }

    /// Create a role. Names are unique and at most one role may sit at `user` level.
    pub async fn create(&self, mut role: NewRole) -> AuthResult<Role> {
        role.name = role.name.trim().to_string();
        if role.name.is_empty() {
            return Err(AuthError::Validation("Role name is required".into()));
        }
        if self.find_by_name(&role.name).await?.is_some() {
            return Err(AuthError::Conflict(format!("Role {} already exists", role.name)));
        }
        if role.level == RoleLevel::User && self.user_level_taken(None).await? {
            return Err(AuthError::Conflict(
                "A default role (level=user) already exists".into(),
            ));
        }
        role.permissions = normalize_permissions(role.permissions);
        let created = with_deadline(self.deadline, self.roles.create(role)).await?;
        info!(role = %created.name, level = %created.level, "created role");
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, mut patch: RolePatch) -> AuthResult<Role> {
        if let Some(name) = patch.name.take() {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AuthError::Validation("Role name is required".into()));
            }
            if self.find_by_name(&name).await?.is_some_and(|r| r.id != id) {
                return Err(AuthError::Conflict(format!("Role {name} already exists")));
            }
            patch.name = Some(name);
        }
        if patch.level == Some(RoleLevel::User) && self.user_level_taken(Some(id)).await? {
            return Err(AuthError::Conflict(
                "A default role (level=user) already exists".into(),
            ));
        }
        patch.permissions = patch.permissions.map(normalize_permissions);
        match with_deadline(self.deadline, self.roles.update(id, patch)).await {
            Ok(role) => Ok(role),
            Err(StoreError::NotFound) => Err(AuthError::NotFound(format!(
                "Role with ID {id} not found"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove(&self, id: Uuid) -> AuthResult<Role> {
        match with_deadline(self.deadline, self.roles.remove(id)).await {
            Ok(role) => {
                info!(role = %role.name, "removed role");
                Ok(role)
            }
            Err(StoreError::NotFound) => Err(AuthError::NotFound(format!(
                "Role with ID {id} not found"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Provision the built-in role ladder. Existing names are left untouched.
    pub async fn seed_defaults(&self) -> AuthResult<Vec<Role>> {
        let mut inherited: BTreeSet<String> = BTreeSet::new();
        let mut seeded = Vec::new();
        for (name, level, permissions, description) in DEFAULT_ROLES {
            inherited.extend(permissions.iter().map(|p| p.to_string()));
            if let Some(existing) = self.find_by_name(name).await? {
                seeded.push(existing);
                continue;
            }
            let role = self
                .create(NewRole {
                    name: name.to_string(),
                    level: *level,
                    permissions: inherited.clone(),
                    description: Some(description.to_string()),
                })
                .await?;
            seeded.push(role);
        }
        Ok(seeded)
    }

    async fn user_level_taken(&self, except: Option<Uuid>) -> AuthResult<bool> {
        let users = with_deadline(self.deadline, self.roles.find_by_level(RoleLevel::User)).await?;
        Ok(users.iter().any(|r| Some(r.id) != except))
    }
}
