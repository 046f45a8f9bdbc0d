//! Domain models.

pub mod auth;

pub use auth::{
    AuthContext, AuthOutcome, AuthProvider, ClientInfo, Credential, CredentialPatch,
    CredentialStatus, NewCredential, NewRole, NewSession, Registration, Role, RoleLevel,
    RolePatch, Session, SessionStatus, TokenClaims, TokenPair, UnknownVariant,
};
