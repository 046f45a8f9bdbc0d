//! JWT token generation and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with separate secrets and
//! lifetimes. Both are bound to the configured issuer and audience.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{TokenClaims, TokenPair};

/// Clock skew tolerated on `exp`.
const LEEWAY_SECS: u64 = 5;

/// Why a token was rejected. Callers collapse all of these to one
/// unauthorized outcome; the distinction is for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,

    #[error("expired token")]
    Expired,

    #[error("malformed token")]
    Malformed,

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::ImmatureSignature => TokenError::Invalid,
            _ => TokenError::Malformed,
        }
    }
}

/// Which key set a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl: std::time::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
        }
    }
}

/// A freshly minted pair plus the refresh token's expiry, for the session ledger.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub pair: TokenPair,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Mints and verifies token pairs. Holds no state beyond key material.
pub struct TokenService {
    access: Keys,
    refresh: Keys,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: Keys::new(&config.access_secret, config.access_ttl),
            refresh: Keys::new(&config.refresh_secret, config.refresh_ttl),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Build a claim set for `kind`, issued at `now`.
    fn claims(
        &self,
        kind: TokenKind,
        credential_id: Uuid,
        email: &str,
        role_id: Uuid,
        now: DateTime<Utc>,
    ) -> TokenClaims {
        TokenClaims {
            sub: credential_id,
            email: email.to_string(),
            role_id,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: now
                .checked_add_signed(self.keys(kind).ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        }
    }

    fn sign(&self, kind: TokenKind, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Issue an access/refresh pair for a credential. No store is touched.
    pub fn issue(
        &self,
        credential_id: Uuid,
        email: &str,
        role_id: Uuid,
    ) -> Result<IssuedTokens, TokenError> {
        let now = Utc::now();
        let access = self.claims(TokenKind::Access, credential_id, email, role_id, now);
        let refresh = self.claims(TokenKind::Refresh, credential_id, email, role_id, now);
        let pair = TokenPair {
            access_token: self.sign(TokenKind::Access, &access)?,
            refresh_token: self.sign(TokenKind::Refresh, &refresh)?,
            expires_in: self.access.ttl.num_seconds(),
            token_type: "Bearer".to_string(),
        };
        let refresh_expires_at = DateTime::from_timestamp(refresh.exp, 0).unwrap_or(now);
        Ok(IssuedTokens {
            pair,
            refresh_expires_at,
        })
    }

    fn verify(&self, kind: TokenKind, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        let data = decode::<TokenClaims>(token, &self.keys(kind).decoding, &validation)?;
        Ok(data.claims)
    }

    /// Verify an access token's signature, issuer, audience and expiry.
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(TokenKind::Access, token)
    }

    /// Verify a refresh token against the refresh secret.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(TokenKind::Refresh, token)
    }
}

/// SHA-256 hex fingerprint of a token, as stored in the session ledger.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig::development())
    }

    #[test]
    fn refresh_roundtrip_preserves_claims() {
        let svc = service();
        let (id, role) = (Uuid::now_v7(), Uuid::now_v7());
        let now = Utc::now();
        let claims = svc.claims(TokenKind::Refresh, id, "a@x.com", role, now);
        let token = svc.sign(TokenKind::Refresh, &claims).unwrap();
        assert_eq!(svc.verify_refresh(&token).unwrap(), claims);
    }

    #[test]
    fn issued_pair_carries_subject_email_and_role() {
        let svc = service();
        let (id, role) = (Uuid::now_v7(), Uuid::now_v7());
        let issued = svc.issue(id, "a@x.com", role).unwrap();

        let access = svc.verify_access(&issued.pair.access_token).unwrap();
        assert_eq!(access.sub, id);
        assert_eq!(access.email, "a@x.com");
        assert_eq!(access.role_id, role);
        assert_eq!(access.iss, "warden-api");
        assert_eq!(access.aud, "warden-users");
        assert_eq!(access.exp - access.iat, 15 * 60);

        let refresh = svc.verify_refresh(&issued.pair.refresh_token).unwrap();
        assert_eq!(refresh.exp - refresh.iat, 7 * 24 * 60 * 60);
        assert_eq!(issued.refresh_expires_at.timestamp(), refresh.exp);
        assert_eq!(issued.pair.expires_in, 900);
        assert_eq!(issued.pair.token_type, "Bearer");
    }

    #[test]
    fn access_and_refresh_keys_are_not_interchangeable() {
        let svc = service();
        let issued = svc.issue(Uuid::now_v7(), "a@x.com", Uuid::now_v7()).unwrap();
        assert_eq!(
            svc.verify_access(&issued.pair.refresh_token),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            svc.verify_refresh(&issued.pair.access_token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_token_reports_expiry() {
        let svc = service();
        let past = Utc::now() - Duration::days(30);
        let claims = svc.claims(TokenKind::Refresh, Uuid::now_v7(), "a@x.com", Uuid::now_v7(), past);
        let token = svc.sign(TokenKind::Refresh, &claims).unwrap();
        assert_eq!(svc.verify_refresh(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let svc = service();
        assert_eq!(svc.verify_refresh("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(svc.verify_refresh(""), Err(TokenError::Malformed));
    }

    #[test]
    fn foreign_audience_is_rejected() {
        let svc = service();
        let mut other_config = AuthConfig::development();
        other_config.audience = "someone-else".into();
        let other = TokenService::new(&other_config);

        let issued = other.issue(Uuid::now_v7(), "a@x.com", Uuid::now_v7()).unwrap();
        assert_eq!(
            svc.verify_refresh(&issued.pair.refresh_token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn tokens_minted_together_are_distinct() {
        let svc = service();
        let (id, role) = (Uuid::now_v7(), Uuid::now_v7());
        let a = svc.issue(id, "a@x.com", role).unwrap();
        let b = svc.issue(id, "a@x.com", role).unwrap();
        assert_ne!(a.pair.refresh_token, b.pair.refresh_token);
        assert_ne!(fingerprint(&a.pair.refresh_token), fingerprint(&b.pair.refresh_token));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = fingerprint("token");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
