//! Password hashing via bcrypt.
//!
//! bcrypt is deliberately slow, so both directions run on the blocking pool
//! instead of stalling the async executor.

use super::{AuthError, AuthResult};

/// Hash a password with bcrypt at `cost`.
pub async fn hash_password(password: &str, cost: u32) -> AuthResult<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("bcrypt task: {e}")))?
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub async fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let (password, hash) = (password.to_owned(), hash.to_owned());
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("bcrypt task: {e}")))?
        .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("secret1", crate::config::MIN_BCRYPT_COST).await.unwrap();
        assert_ne!(hash, "secret1");
        assert!(verify_password("secret1", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn hashes_are_salted() {
        let a = hash_password("secret1", crate::config::MIN_BCRYPT_COST).await.unwrap();
        let b = hash_password("secret1", crate::config::MIN_BCRYPT_COST).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn hash_embeds_requested_cost() {
        let hash = hash_password("secret1", 5).await.unwrap();
        assert!(hash.starts_with("$2b$05$"), "unexpected hash prefix: {hash}");
    }

    #[tokio::test]
    async fn corrupt_hash_is_an_internal_error() {
        let err = verify_password("secret1", "not-a-bcrypt-hash").await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
