//! Permission resolution.
//!
//! A permission is granted when either the credential's role lists it or the
//! credential's own override set does. Overrides are additive only.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::validation::normalize_permissions;
use super::{AuthError, AuthResult};
use crate::models::{Credential, CredentialPatch, Role};
use crate::store::{CredentialStore, RoleStore, StoreError, with_deadline};

/// Pure grant check. A missing role contributes nothing.
pub fn is_granted(role: Option<&Role>, overrides: &BTreeSet<String>, permission: &str) -> bool {
    overrides.contains(permission) || role.is_some_and(|r| r.grants(permission))
}

#[derive(Clone)]
pub struct PermissionResolver {
    credentials: Arc<dyn CredentialStore>,
    roles: Arc<dyn RoleStore>,
    deadline: Duration,
}

impl PermissionResolver {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        roles: Arc<dyn RoleStore>,
        deadline: Duration,
    ) -> Self {
        Self {
            credentials,
            roles,
            deadline,
        }
    }

    /// Whether `permission` is granted to `credential` under `role_id`.
    ///
    /// Total: an unresolvable role or a failing role lookup yields `false`
    /// for the role side instead of an error.
    pub async fn has_permission(
        &self,
        credential: &Credential,
        role_id: Uuid,
        permission: &str,
    ) -> bool {
        if credential.permissions.contains(permission) {
            return true;
        }
        let role = match with_deadline(self.deadline, self.roles.find_by_id(role_id)).await {
            Ok(role) => role,
            Err(e) => {
                warn!(%role_id, error = %e, "role lookup failed during permission check");
                None
            }
        };
        if role.is_none() {
            debug!(%role_id, "role not found; role grants nothing");
        }
        is_granted(role.as_ref(), &credential.permissions, permission)
    }

    /// Replace a credential's override set wholesale.
    pub async fn update_permissions(
        &self,
        credential_id: Uuid,
        permissions: BTreeSet<String>,
    ) -> AuthResult<Credential> {
        let patch = CredentialPatch {
            permissions: Some(normalize_permissions(permissions)),
            ..Default::default()
        };
        match with_deadline(self.deadline, self.credentials.update(credential_id, patch)).await {
            Ok(credential) => Ok(credential),
            Err(StoreError::NotFound) => Err(AuthError::NotFound(format!(
                "Credential {credential_id} not found"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
