//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! shapes in `warden_api` (which carry `#[serde(rename)]` for camelCase etc.).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A stored string did not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed string-backed enums shared by the stores, config and the wire.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Origin of a credential. Only `Local` credentials carry a password hash.
    AuthProvider, "auth provider" {
        Local => "local",
        Google => "google",
        Facebook => "facebook",
        Github => "github",
    }
);

string_enum!(
    /// Account status. Only `Active` permits login, refresh and bearer access.
    CredentialStatus, "credential status" {
        Active => "active",
        Suspended => "suspended",
        Pending => "pending",
        Banned => "banned",
    }
);

string_enum!(
    /// Role hierarchy level, ordered by privilege (`User` lowest).
    RoleLevel, "role level" {
        User => "user",
        Moderator => "moderator",
        Admin => "admin",
        SuperAdmin => "super_admin",
    }
);

string_enum!(
    /// Lifecycle of a recorded refresh token.
    SessionStatus, "session status" {
        Active => "active",
        Expired => "expired",
        Revoked => "revoked",
    }
);

impl Default for AuthProvider {
    fn default() -> Self {
        AuthProvider::Local
    }
}

impl RoleLevel {
    /// Privilege rank, `0` for `User`.
    pub fn rank(self) -> u8 {
        match self {
            RoleLevel::User => 0,
            RoleLevel::Moderator => 1,
            RoleLevel::Admin => 2,
            RoleLevel::SuperAdmin => 3,
        }
    }
}

impl PartialOrd for RoleLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoleLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Authentication record for one principal.
///
/// `status` is the single authoritative account state; [`Credential::is_active`]
/// is derived from it and never stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    /// Owning identity. Relation only; the identity record lives elsewhere.
    pub subject_ref: Uuid,
    /// Normalized (trimmed, lowercase) address.
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role_id: Uuid,
    /// Additive grants layered on top of the role.
    pub permissions: BTreeSet<String>,
    pub provider: AuthProvider,
    pub status: CredentialStatus,
    pub login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_active(&self) -> bool {
        self.status == CredentialStatus::Active
    }

    /// Whether a lockout window is still open at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Insert payload for a new credential. The store assigns `id` and timestamps.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub subject_ref: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub role_id: Uuid,
    pub provider: AuthProvider,
    pub status: CredentialStatus,
}

/// Partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub permissions: Option<BTreeSet<String>>,
    pub status: Option<CredentialStatus>,
    pub login_attempts: Option<u32>,
    /// `Some(None)` clears the lockout.
    pub locked_until: Option<Option<DateTime<Utc>>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Named, leveled bundle of permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub level: RoleLevel,
    pub permissions: BTreeSet<String>,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub level: RoleLevel,
    pub permissions: BTreeSet<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub name: Option<String>,
    pub level: Option<RoleLevel>,
    pub permissions: Option<BTreeSet<String>>,
    pub is_active: Option<bool>,
    pub description: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Ledger entry for one issued refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub credential_id: Uuid,
    /// SHA-256 hex fingerprint of the refresh token; the token itself is never stored.
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Status as observed at `now`: an active session past its expiry reads as `Expired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        match self.status {
            SessionStatus::Active if self.expires_at <= now => SessionStatus::Expired,
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub credential_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Request metadata recorded alongside a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Claims embedded in both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the credential ID.
    pub sub: Uuid,
    pub email: String,
    #[serde(rename = "roleId")]
    pub role_id: Uuid,
    pub iss: String,
    pub aud: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Unique token ID; keeps two tokens minted in the same second distinct.
    pub jti: Uuid,
}

/// Access/refresh token pair handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub token_type: String,
}

// ---------------------------------------------------------------------------
// Engine inputs / outputs
// ---------------------------------------------------------------------------

/// Input to [`crate::AuthEngine::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    /// Defaults to [`AuthProvider::Local`].
    pub provider: Option<AuthProvider>,
}

/// Result of a successful register or login.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub credential: Credential,
    pub tokens: TokenPair,
}

/// Principal resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub credential_id: Uuid,
    pub email: String,
    pub role_id: Uuid,
    pub permissions: BTreeSet<String>,
}
