//! Request and response bodies. Field names are camelCase on the wire.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::models::{
    AuthContext, AuthProvider, Credential, CredentialStatus, Role, RoleLevel, TokenPair,
};

// Missing fields deserialize as empty so the engine reports them as
// validation errors rather than the extractor rejecting the body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    pub provider: Option<AuthProvider>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckPermissionRequest {
    pub permission: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePermissionsRequest {
    pub permissions: Vec<String>,
}

/// Public projection of a credential. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialView {
    pub id: Uuid,
    pub subject_ref: Uuid,
    pub email: String,
    pub name: String,
    pub role_id: Uuid,
    pub permissions: BTreeSet<String>,
    pub provider: AuthProvider,
    pub status: CredentialStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Credential> for CredentialView {
    fn from(c: Credential) -> Self {
        Self {
            id: c.id,
            subject_ref: c.subject_ref,
            email: c.email,
            name: c.name,
            role_id: c.role_id,
            permissions: c.permissions,
            provider: c.provider,
            status: c.status,
            last_login_at: c.last_login_at,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: CredentialView,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub auth_id: Uuid,
    pub email: String,
    pub role_id: Uuid,
    pub permissions: BTreeSet<String>,
}

impl From<AuthContext> for ProfileResponse {
    fn from(ctx: AuthContext) -> Self {
        Self {
            auth_id: ctx.credential_id,
            email: ctx.email,
            role_id: ctx.role_id,
            permissions: ctx.permissions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleView {
    pub id: Uuid,
    pub name: String,
    pub level: RoleLevel,
    pub permissions: BTreeSet<String>,
    pub is_active: bool,
    pub description: Option<String>,
}

impl From<Role> for RoleView {
    fn from(r: Role) -> Self {
        Self {
            id: r.id,
            name: r.name,
            level: r.level,
            permissions: r.permissions,
            is_active: r.is_active,
            description: r.description,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheckResponse {
    pub has_permission: bool,
}
