//! Authentication engine: register, login, refresh, logout and permission
//! checks composed over the stores, the token service and the resolver.
//!
//! Session contract under the default [`SessionPolicy::Stateless`]:
//! refresh rotation is non-destructive (every valid refresh token stays
//! usable until its own expiry) and logout does not revoke anything a
//! verifier consults. Callers must not assume logout makes a refresh token
//! unusable. [`SessionPolicy::Tracked`] turns the session ledger into a
//! revocation check.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::jwt::{TokenService, fingerprint};
use super::password::{hash_password, verify_password};
use super::permissions::PermissionResolver;
use super::roles::RoleService;
use super::validation::{normalize_email, validate_email, validate_name, validate_password};
use super::{
    AuthError, AuthResult, INVALID_CREDENTIALS, INVALID_REFRESH_TOKEN, INVALID_TOKEN,
};
use crate::config::{AuthConfig, ConfigError, SessionPolicy};
use crate::models::{
    AuthContext, AuthOutcome, AuthProvider, ClientInfo, Credential, CredentialPatch,
    CredentialStatus, NewCredential, NewSession, Registration, Session, SessionStatus, TokenPair,
};
use crate::store::{StoreError, StoreResult, Stores, with_deadline};

#[derive(Clone)]
pub struct AuthEngine {
    config: Arc<AuthConfig>,
    stores: Stores,
    tokens: Arc<TokenService>,
    resolver: PermissionResolver,
    roles: RoleService,
}

impl AuthEngine {
    /// Build an engine. The configuration is validated once here.
    pub fn new(config: AuthConfig, stores: Stores) -> Result<Self, ConfigError> {
        config.validate()?;
        let tokens = Arc::new(TokenService::new(&config));
        let resolver = PermissionResolver::new(
            stores.credentials.clone(),
            stores.roles.clone(),
            config.store_timeout,
        );
        let roles = RoleService::new(stores.roles.clone(), config.store_timeout);
        Ok(Self {
            config: Arc::new(config),
            stores,
            tokens,
            resolver,
            roles,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn roles(&self) -> &RoleService {
        &self.roles
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.resolver
    }

    async fn within<T>(
        &self,
        fut: impl std::future::Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        with_deadline(self.config.store_timeout, fut).await
    }

    // -------------------------------------------------------------------------
    // Registration & login
    // -------------------------------------------------------------------------

    /// Create a credential under the default role and issue its first token pair.
    pub async fn register(
        &self,
        registration: Registration,
        client: &ClientInfo,
    ) -> AuthResult<AuthOutcome> {
        let email = validate_email(&registration.email)?;
        let name = validate_name(&registration.name)?;
        let provider = registration.provider.unwrap_or_default();
        if provider == AuthProvider::Local {
            validate_password(&registration.password)?;
        }

        if self
            .within(self.stores.credentials.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("Email already registered".into()));
        }

        let default_role = self.roles.default_role().await?;

        let password_hash = match provider {
            AuthProvider::Local => {
                Some(hash_password(&registration.password, self.config.bcrypt_cost).await?)
            }
            _ => None,
        };

        let record = NewCredential {
            subject_ref: Uuid::now_v7(),
            email,
            name,
            password_hash,
            role_id: default_role.id,
            provider,
            status: CredentialStatus::Active,
        };
        // The store's uniqueness constraint settles concurrent registrations.
        let credential = match self.within(self.stores.credentials.create(record)).await {
            Ok(c) => c,
            Err(StoreError::Conflict(_)) => {
                return Err(AuthError::Conflict("Email already registered".into()));
            }
            Err(e) => return Err(e.into()),
        };
        info!(credential_id = %credential.id, %provider, "registered credential");

        let tokens = self.issue_for(&credential, client).await?;
        Ok(AuthOutcome {
            credential,
            tokens,
        })
    }

    /// Verify email + password. Every failure is the same `Unauthorized`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> AuthResult<AuthOutcome> {
        let email = normalize_email(email);
        let credential = self
            .within(self.stores.credentials.find_by_email(&email))
            .await?
            .filter(Credential::is_active)
            .ok_or_else(|| AuthError::unauthorized(INVALID_CREDENTIALS))?;

        let now = Utc::now();
        if credential.is_locked(now) {
            debug!(credential_id = %credential.id, "login rejected: account locked");
            return Err(AuthError::unauthorized(INVALID_CREDENTIALS));
        }

        let Some(hash) = credential.password_hash.as_deref() else {
            return Err(AuthError::unauthorized(INVALID_CREDENTIALS));
        };

        if !verify_password(password, hash).await? {
            if let Err(e) = self.record_failed_login(&credential, now).await {
                warn!(credential_id = %credential.id, error = %e, "failed to record failed login");
            }
            return Err(AuthError::unauthorized(INVALID_CREDENTIALS));
        }

        let patch = CredentialPatch {
            login_attempts: Some(0),
            locked_until: Some(None),
            last_login_at: Some(now),
            ..Default::default()
        };
        let credential = self
            .within(self.stores.credentials.update(credential.id, patch))
            .await?;
        info!(credential_id = %credential.id, "login succeeded");

        let tokens = self.issue_for(&credential, client).await?;
        Ok(AuthOutcome {
            credential,
            tokens,
        })
    }

    async fn record_failed_login(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let policy = self.config.lockout;
        let until = now
            + chrono::Duration::from_std(policy.lock_duration)
                .unwrap_or_else(|_| chrono::Duration::days(1));
        let updated = self
            .within(self.stores.credentials.record_failed_login(
                credential.id,
                policy.max_attempts,
                until,
            ))
            .await?;
        if updated.locked_until == Some(until) {
            warn!(
                credential_id = %credential.id,
                max_attempts = policy.max_attempts,
                %until,
                "locking credential after failed logins"
            );
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Token lifecycle
    // -------------------------------------------------------------------------

    /// Exchange a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str, client: &ClientInfo) -> AuthResult<TokenPair> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|e| {
            debug!(reason = %e, "refresh token rejected");
            AuthError::unauthorized(INVALID_REFRESH_TOKEN)
        })?;

        let credential = self
            .within(self.stores.credentials.find_by_id(claims.sub))
            .await?
            .filter(Credential::is_active)
            .ok_or_else(|| AuthError::unauthorized(INVALID_REFRESH_TOKEN))?;

        if self.config.session_policy == SessionPolicy::Tracked {
            self.consume_session(refresh_token, credential.id).await?;
        }

        self.issue_for(&credential, client).await
    }

    /// Single-use check against the ledger (tracked policy only).
    async fn consume_session(&self, refresh_token: &str, credential_id: Uuid) -> AuthResult<()> {
        let hash = fingerprint(refresh_token);
        let session = self
            .within(self.stores.sessions.find_by_token_hash(&hash))
            .await?
            .filter(|s| s.credential_id == credential_id)
            .ok_or_else(|| AuthError::unauthorized(INVALID_REFRESH_TOKEN))?;

        match session.effective_status(Utc::now()) {
            SessionStatus::Active => {}
            SessionStatus::Expired => {
                self.within(self.stores.sessions.set_status(session.id, SessionStatus::Expired))
                    .await?;
                return Err(AuthError::unauthorized(INVALID_REFRESH_TOKEN));
            }
            SessionStatus::Revoked => {
                warn!(session_id = %session.id, %credential_id, "revoked refresh token presented");
                return Err(AuthError::unauthorized(INVALID_REFRESH_TOKEN));
            }
        }
        // Compare-and-set: of concurrent refreshes only one wins the transition.
        if !self
            .within(self.stores.sessions.revoke_if_active(session.id))
            .await?
        {
            debug!(session_id = %session.id, "refresh token already consumed");
            return Err(AuthError::unauthorized(INVALID_REFRESH_TOKEN));
        }
        Ok(())
    }

    /// Always succeeds. Marks the matching ledger entry revoked when the
    /// token verifies; under the stateless policy that entry is never
    /// consulted, so the token itself stays usable until expiry.
    pub async fn logout(&self, refresh_token: &str) {
        let claims = match self.tokens.verify_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(reason = %e, "logout with unverifiable refresh token");
                return;
            }
        };

        let hash = fingerprint(refresh_token);
        let session = match self.within(self.stores.sessions.find_by_token_hash(&hash)).await {
            Ok(Some(session)) if session.status == SessionStatus::Active => session,
            Ok(_) => return,
            Err(e) => {
                debug!(error = %e, "logout: session lookup failed");
                return;
            }
        };
        match self
            .within(self.stores.sessions.revoke_if_active(session.id))
            .await
        {
            Ok(true) => info!(credential_id = %claims.sub, session_id = %session.id, "logged out"),
            Ok(false) => {}
            Err(e) => debug!(error = %e, "logout: session revoke failed"),
        }
    }

    /// Mint a pair for `credential` and record it in the session ledger.
    async fn issue_for(&self, credential: &Credential, client: &ClientInfo) -> AuthResult<TokenPair> {
        let issued = self
            .tokens
            .issue(credential.id, &credential.email, credential.role_id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let session = NewSession {
            credential_id: credential.id,
            token_hash: fingerprint(&issued.pair.refresh_token),
            expires_at: issued.refresh_expires_at,
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_address.clone(),
        };
        if let Err(e) = self.within(self.stores.sessions.create(session)).await {
            match self.config.session_policy {
                SessionPolicy::Tracked => return Err(e.into()),
                SessionPolicy::Stateless => {
                    warn!(credential_id = %credential.id, error = %e, "failed to record session");
                }
            }
        }
        Ok(issued.pair)
    }

    // -------------------------------------------------------------------------
    // Bearer access & authorization
    // -------------------------------------------------------------------------

    /// Resolve an access token to the principal it authenticates. The
    /// credential must still exist and be active.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<AuthContext> {
        let claims = self.tokens.verify_access(access_token).map_err(|e| {
            debug!(reason = %e, "access token rejected");
            AuthError::unauthorized(INVALID_TOKEN)
        })?;
        let credential = self
            .within(self.stores.credentials.find_by_id(claims.sub))
            .await?
            .filter(Credential::is_active)
            .ok_or_else(|| AuthError::unauthorized(INVALID_TOKEN))?;
        Ok(AuthContext {
            credential_id: claims.sub,
            email: claims.email,
            role_id: claims.role_id,
            permissions: credential.permissions,
        })
    }

    /// Total: an unknown credential or a failing lookup yields `false`.
    pub async fn has_permission(&self, credential_id: Uuid, permission: &str) -> bool {
        let credential = match self.within(self.stores.credentials.find_by_id(credential_id)).await {
            Ok(Some(credential)) => credential,
            Ok(None) => return false,
            Err(e) => {
                warn!(%credential_id, error = %e, "credential lookup failed during permission check");
                return false;
            }
        };
        self.resolver
            .has_permission(&credential, credential.role_id, permission)
            .await
    }

    /// Replace a credential's permission overrides.
    pub async fn update_permissions(
        &self,
        credential_id: Uuid,
        permissions: BTreeSet<String>,
    ) -> AuthResult<Credential> {
        let credential = self
            .resolver
            .update_permissions(credential_id, permissions)
            .await?;
        info!(%credential_id, count = credential.permissions.len(), "updated permission overrides");
        Ok(credential)
    }

    pub async fn credential(&self, credential_id: Uuid) -> AuthResult<Credential> {
        self.within(self.stores.credentials.find_by_id(credential_id))
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("Credential {credential_id} not found")))
    }

    /// A credential's sessions, newest first, with lapsed ones reported as expired.
    pub async fn sessions(&self, credential_id: Uuid) -> AuthResult<Vec<Session>> {
        let now = Utc::now();
        let mut sessions = self
            .within(self.stores.sessions.list_for_credential(credential_id))
            .await?;
        for session in &mut sessions {
            session.status = session.effective_status(now);
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::LockoutPolicy;
    use crate::models::NewCredential;
    use crate::store::CredentialStore;
    use crate::store::memory::MemoryCredentialStore;

    fn config() -> AuthConfig {
        AuthConfig {
            bcrypt_cost: crate::config::MIN_BCRYPT_COST,
            ..AuthConfig::development()
        }
    }

    async fn engine_with(config: AuthConfig) -> AuthEngine {
        let engine = AuthEngine::new(config, Stores::in_memory()).unwrap();
        engine.roles().seed_defaults().await.unwrap();
        engine
    }

    async fn engine() -> AuthEngine {
        engine_with(config()).await
    }

    fn ann() -> Registration {
        Registration {
            email: "a@x.com".into(),
            password: "secret1".into(),
            name: "Ann".into(),
            provider: None,
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            user_agent: Some("tests".into()),
            ip_address: Some("127.0.0.1".into()),
        }
    }

    #[tokio::test]
    async fn register_then_login_scenario() {
        let engine = engine().await;

        let registered = engine.register(ann(), &client()).await.unwrap();
        assert_eq!(registered.credential.status, CredentialStatus::Active);
        assert_eq!(registered.credential.provider, AuthProvider::Local);
        assert!(!registered.tokens.access_token.is_empty());
        assert!(!registered.tokens.refresh_token.is_empty());
        let default = engine.roles().default_role().await.unwrap();
        assert_eq!(registered.credential.role_id, default.id);

        let logged_in = engine.login("a@x.com", "secret1", &client()).await.unwrap();
        assert_eq!(logged_in.credential.login_attempts, 0);
        assert!(logged_in.credential.last_login_at.is_some());

        let err = engine.login("a@x.com", "wrong", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn password_is_stored_hashed() {
        let engine = engine().await;
        let outcome = engine.register(ann(), &client()).await.unwrap();
        let hash = outcome.credential.password_hash.unwrap();
        assert_ne!(hash, "secret1");
        assert!(hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_regardless_of_case() {
        let engine = engine().await;
        engine.register(ann(), &client()).await.unwrap();
        let mut again = ann();
        again.email = " A@X.com ".into();
        let err = engine.register(again, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_registrations_admit_exactly_one() {
        let engine = engine().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.register(ann(), &ClientInfo::default()).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AuthError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn register_without_default_role_is_a_configuration_error() {
        let engine = AuthEngine::new(config(), Stores::in_memory()).unwrap();
        let err = engine.register(ann(), &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let engine = engine().await;
        let mut bad = ann();
        bad.email = "not-an-email".into();
        assert!(matches!(
            engine.register(bad, &client()).await,
            Err(AuthError::Validation(_))
        ));

        let mut bad = ann();
        bad.password = "123".into();
        assert!(matches!(
            engine.register(bad, &client()).await,
            Err(AuthError::Validation(_))
        ));

        let mut bad = ann();
        bad.name = " ".into();
        assert!(matches!(
            engine.register(bad, &client()).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn external_provider_credentials_cannot_use_password_login() {
        let engine = engine().await;
        let mut reg = ann();
        reg.provider = Some(AuthProvider::Github);
        reg.password = String::new();
        let outcome = engine.register(reg, &client()).await.unwrap();
        assert_eq!(outcome.credential.provider, AuthProvider::Github);
        assert!(outcome.credential.password_hash.is_none());

        let err = engine.login("a@x.com", "", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let engine = engine().await;
        engine.register(ann(), &client()).await.unwrap();

        let unknown = engine.login("nobody@x.com", "secret1", &client()).await.unwrap_err();
        let wrong = engine.login("a@x.com", "nope", &client()).await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn inactive_credentials_cannot_login() {
        let engine = engine().await;
        let outcome = engine.register(ann(), &client()).await.unwrap();
        for status in [
            CredentialStatus::Suspended,
            CredentialStatus::Pending,
            CredentialStatus::Banned,
        ] {
            engine
                .stores
                .credentials
                .update(
                    outcome.credential.id,
                    CredentialPatch {
                        status: Some(status),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            let err = engine.login("a@x.com", "secret1", &client()).await.unwrap_err();
            assert!(matches!(err, AuthError::Unauthorized(_)), "{status} logged in");
        }
    }

    #[tokio::test]
    async fn failed_logins_lock_the_account() {
        let engine = engine_with(AuthConfig {
            lockout: LockoutPolicy {
                max_attempts: 3,
                lock_duration: Duration::from_secs(600),
            },
            ..config()
        })
        .await;
        let id = engine.register(ann(), &client()).await.unwrap().credential.id;

        for expected in 1..3 {
            engine.login("a@x.com", "wrong", &client()).await.unwrap_err();
            assert_eq!(engine.credential(id).await.unwrap().login_attempts, expected);
        }
        engine.login("a@x.com", "wrong", &client()).await.unwrap_err();
        let locked = engine.credential(id).await.unwrap();
        assert!(locked.is_locked(Utc::now()));
        assert_eq!(locked.login_attempts, 0);

        // Correct password is refused while the lock is open.
        let err = engine.login("a@x.com", "secret1", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn parallel_failed_logins_still_lock_the_account() {
        let engine = engine_with(AuthConfig {
            lockout: LockoutPolicy {
                max_attempts: 3,
                lock_duration: Duration::from_secs(600),
            },
            ..config()
        })
        .await;
        let id = engine.register(ann(), &client()).await.unwrap().credential.id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.login("a@x.com", "wrong", &ClientInfo::default()).await
            }));
        }
        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert!(matches!(err, AuthError::Unauthorized(_)), "{err}");
        }

        assert!(engine.credential(id).await.unwrap().is_locked(Utc::now()));
        let err = engine.login("a@x.com", "secret1", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    /// Delegates to the memory store but cannot record failed logins.
    struct BrokenCounter(MemoryCredentialStore);

    #[async_trait]
    impl CredentialStore for BrokenCounter {
        async fn find_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
            self.0.find_by_email(email).await
        }

        async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>> {
            self.0.find_by_id(id).await
        }

        async fn create(&self, record: NewCredential) -> StoreResult<Credential> {
            self.0.create(record).await
        }

        async fn update(&self, id: Uuid, patch: CredentialPatch) -> StoreResult<Credential> {
            self.0.update(id, patch).await
        }

        async fn record_failed_login(
            &self,
            _id: Uuid,
            _max_attempts: u32,
            _lock_until: DateTime<Utc>,
        ) -> StoreResult<Credential> {
            Err(StoreError::Unknown("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn failed_login_bookkeeping_errors_stay_unauthorized() {
        let stores = Stores {
            credentials: Arc::new(BrokenCounter(MemoryCredentialStore::new())),
            ..Stores::in_memory()
        };
        let engine = AuthEngine::new(config(), stores).unwrap();
        engine.roles().seed_defaults().await.unwrap();
        engine.register(ann(), &client()).await.unwrap();

        let err = engine.login("a@x.com", "wrong", &client()).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Unauthorized: {INVALID_CREDENTIALS}"));
        engine.login("a@x.com", "secret1", &client()).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_allows_login_and_resets_state() {
        let engine = engine().await;
        let id = engine.register(ann(), &client()).await.unwrap().credential.id;
        engine
            .stores
            .credentials
            .update(
                id,
                CredentialPatch {
                    login_attempts: Some(2),
                    locked_until: Some(Some(Utc::now() - chrono::Duration::seconds(1))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = engine.login("a@x.com", "secret1", &client()).await.unwrap();
        assert_eq!(outcome.credential.login_attempts, 0);
        assert!(outcome.credential.locked_until.is_none());
    }

    #[tokio::test]
    async fn disabled_lockout_only_counts() {
        let engine = engine_with(AuthConfig {
            lockout: LockoutPolicy {
                max_attempts: 0,
                lock_duration: Duration::from_secs(600),
            },
            ..config()
        })
        .await;
        let id = engine.register(ann(), &client()).await.unwrap().credential.id;
        for _ in 0..7 {
            engine.login("a@x.com", "wrong", &client()).await.unwrap_err();
        }
        let c = engine.credential(id).await.unwrap();
        assert_eq!(c.login_attempts, 7);
        assert!(c.locked_until.is_none());
        engine.login("a@x.com", "secret1", &client()).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_is_non_destructive_by_default() {
        let engine = engine().await;
        let first = engine.register(ann(), &client()).await.unwrap().tokens;

        let second = engine.refresh(&first.refresh_token, &client()).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        // Both the old and the new refresh token remain usable.
        engine.refresh(&first.refresh_token, &client()).await.unwrap();
        engine.refresh(&second.refresh_token, &client()).await.unwrap();
        assert!(engine.tokens().verify_refresh(&first.refresh_token).is_ok());
    }

    #[tokio::test]
    async fn refresh_rejects_bad_tokens_uniformly() {
        let engine = engine().await;
        let tokens = engine.register(ann(), &client()).await.unwrap().tokens;

        for bad in ["garbage", "", tokens.access_token.as_str()] {
            let err = engine.refresh(bad, &client()).await.unwrap_err();
            assert_eq!(err.to_string(), format!("Unauthorized: {INVALID_REFRESH_TOKEN}"));
        }
    }

    #[tokio::test]
    async fn refresh_requires_an_active_credential() {
        let engine = engine().await;
        let outcome = engine.register(ann(), &client()).await.unwrap();
        engine
            .stores
            .credentials
            .update(
                outcome.credential.id,
                CredentialPatch {
                    status: Some(CredentialStatus::Suspended),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = engine
            .refresh(&outcome.tokens.refresh_token, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn logout_always_succeeds_and_does_not_revoke_by_default() {
        let engine = engine().await;
        let tokens = engine.register(ann(), &client()).await.unwrap().tokens;

        engine.logout("definitely not a token").await;
        engine.logout("").await;
        engine.logout(&tokens.refresh_token).await;
        engine.logout(&tokens.refresh_token).await;

        // Stateless: the ledger records the revocation, refresh ignores it.
        engine.refresh(&tokens.refresh_token, &client()).await.unwrap();
        let credential_id = engine.authenticate(&tokens.access_token).await.unwrap().credential_id;
        let sessions = engine.sessions(credential_id).await.unwrap();
        assert!(sessions.iter().any(|s| s.status == SessionStatus::Revoked));
    }

    #[tokio::test]
    async fn tracked_policy_makes_refresh_single_use() {
        let engine = engine_with(AuthConfig {
            session_policy: SessionPolicy::Tracked,
            ..config()
        })
        .await;
        let first = engine.register(ann(), &client()).await.unwrap().tokens;

        let second = engine.refresh(&first.refresh_token, &client()).await.unwrap();
        let err = engine.refresh(&first.refresh_token, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));

        engine.logout(&second.refresh_token).await;
        let err = engine.refresh(&second.refresh_token, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn concurrent_tracked_refreshes_admit_exactly_one() {
        let engine = engine_with(AuthConfig {
            session_policy: SessionPolicy::Tracked,
            ..config()
        })
        .await;
        let refresh_token = engine.register(ann(), &client()).await.unwrap().tokens.refresh_token;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let token = refresh_token.clone();
            handles.push(tokio::spawn(async move {
                engine.refresh(&token, &ClientInfo::default()).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AuthError::Unauthorized(msg)) => assert_eq!(msg, INVALID_REFRESH_TOKEN),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn sessions_record_client_metadata() {
        let engine = engine().await;
        let outcome = engine.register(ann(), &client()).await.unwrap();
        let sessions = engine.sessions(outcome.credential.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Active);
        assert_eq!(sessions[0].user_agent.as_deref(), Some("tests"));
        assert_eq!(sessions[0].ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(sessions[0].token_hash, fingerprint(&outcome.tokens.refresh_token));
    }

    #[tokio::test]
    async fn authenticate_resolves_the_principal() {
        let engine = engine().await;
        let outcome = engine.register(ann(), &client()).await.unwrap();
        let ctx = engine.authenticate(&outcome.tokens.access_token).await.unwrap();
        assert_eq!(ctx.credential_id, outcome.credential.id);
        assert_eq!(ctx.email, "a@x.com");
        assert_eq!(ctx.role_id, outcome.credential.role_id);

        let err = engine
            .authenticate(&outcome.tokens.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Unauthorized: {INVALID_TOKEN}"));
    }

    #[tokio::test]
    async fn permission_scenario_role_plus_override() {
        let engine = AuthEngine::new(config(), Stores::in_memory()).unwrap();
        engine
            .roles()
            .create(crate::models::NewRole {
                name: "user".into(),
                level: crate::models::RoleLevel::User,
                permissions: BTreeSet::from(["read:self".to_string()]),
                description: None,
            })
            .await
            .unwrap();
        let id = engine.register(ann(), &client()).await.unwrap().credential.id;
        engine
            .update_permissions(id, BTreeSet::from(["write:reports".to_string()]))
            .await
            .unwrap();

        assert!(engine.has_permission(id, "write:reports").await);
        assert!(engine.has_permission(id, "read:self").await);
        assert!(!engine.has_permission(id, "delete:users").await);
    }

    #[tokio::test]
    async fn permission_check_on_unknown_credential_is_false() {
        let engine = engine().await;
        assert!(!engine.has_permission(Uuid::now_v7(), "read:self").await);
    }

    #[tokio::test]
    async fn update_permissions_on_unknown_credential_is_not_found() {
        let engine = engine().await;
        let err = engine
            .update_permissions(Uuid::now_v7(), BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[test]
    fn engine_rejects_shared_secrets() {
        let mut cfg = config();
        cfg.refresh_secret = cfg.access_secret.clone();
        assert!(matches!(
            AuthEngine::new(cfg, Stores::in_memory()),
            Err(ConfigError::SharedSecret)
        ));
    }
}
