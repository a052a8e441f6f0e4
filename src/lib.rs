//! yasso — yet another single sign-on.
//!
//! The token issuance / delegation core of a multi-actor SSO backend. It
//! mints and verifies five kinds of self-contained signed bearer tokens,
//! resolves them to typed principals, keeps the user↔service authorization
//! grants, and runs the OAuth-style delegation flow on top (code exchange,
//! refresh, status query, scoped user-info disclosure).
//!
//! Revocation works without storage: each subject carries a mutable
//! timestamp (password change time for users, secret revocation time for
//! services) and any token issued before it is dead. One timestamp bump
//! revokes everything in O(1); no token registry or blacklist exists.
//!
//! HTTP routing, rate limiting, mail and the rest of the outer surface live
//! in the embedding server, not here.

mod error;
mod grants;
mod model;
mod oauth;
mod password;
mod principal;
mod store;
mod token;

pub use error::AuthError;
pub use grants::{GrantStore, MemoryGrantStore};
pub use model::{
    AuthorizationStatus, BasicUserInfo, Grant, GrantId, Permission, ServiceId, ServiceInfo,
    ServicePermission, ServiceStatus, UserFull, UserId, UserInfo,
};
pub use oauth::{AccessAndRefreshToken, AccessToken, UserInfoResponse};
pub use password::{hash_password, verify_password};
pub use principal::{Principal, TokenValidator};
pub use store::{CredentialStore, MemoryDirectory};
pub use token::{
    Claims, ISSUER, OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS,
    OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS, OAUTH_CODE_VALIDITY_SECS,
    OAUTH_REFRESH_TOKEN_VALIDITY_SECS, SERVICE_TOKEN_VALIDITY_SECS, Token, TokenCodec,
    TokenIssuer, TokenType, USER_TOKEN_VALIDITY_SECS,
};

use chrono::Duration;
use std::sync::Arc;

/// Process-wide configuration, injected once at startup.
#[derive(Debug, Clone, Default)]
pub struct SsoConfig {
    /// Symmetric signing secret. With `None` a random per-process key is
    /// generated: every token issued before a restart then fails
    /// verification, which is accepted operational behaviour.
    pub signing_secret: Option<String>,
}

/// The assembled SSO core: codec, issuer, validator and the two stores
/// behind one operation surface.
///
/// Everything here is cheap and concurrent: the signing key is written once
/// at construction and read-only afterwards, and token work is independent
/// per token. The only serialized state is the grant upsert, inside the
/// [`GrantStore`].
pub struct SsoService {
    pub(crate) issuer: TokenIssuer,
    pub(crate) validator: TokenValidator,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) grants: Arc<dyn GrantStore>,
}

impl SsoService {
    pub fn new(
        config: SsoConfig,
        credentials: Arc<dyn CredentialStore>,
        grants: Arc<dyn GrantStore>,
    ) -> Self {
        let secret = config.signing_secret.unwrap_or_else(|| {
            tracing::warn!(
                "no signing secret configured, using a random per-process key; \
                 previously issued tokens will not verify"
            );
            uuid::Uuid::new_v4().to_string()
        });
        let codec = Arc::new(TokenCodec::new(&secret));
        Self {
            issuer: TokenIssuer::new(codec.clone()),
            validator: TokenValidator::new(codec, credentials.clone()),
            credentials,
            grants,
        }
    }

    // --- token issuance ---

    pub fn issue_user_token(&self, user: UserId) -> Result<Token, AuthError> {
        self.issuer.user_token(user)
    }

    pub fn issue_service_token(&self, service: ServiceId) -> Result<Token, AuthError> {
        self.issuer.service_token(service)
    }

    /// Mint an authorization code for a logged-in user. Unconditional: the
    /// code is bound to the user alone and proves nothing about any grant.
    pub fn issue_oauth_code(&self, user: UserId) -> Result<Token, AuthError> {
        self.issuer.oauth_code(user)
    }

    pub fn issue_oauth_access_token(
        &self,
        service: ServiceId,
        user: UserId,
        validity: Option<Duration>,
    ) -> Result<Token, AuthError> {
        self.issuer.oauth_access_token(service, user, validity)
    }

    pub fn issue_oauth_refresh_token(
        &self,
        service: ServiceId,
        user: UserId,
    ) -> Result<Token, AuthError> {
        self.issuer.oauth_refresh_token(service, user)
    }

    /// Verify a token and resolve its principal. See
    /// [`TokenValidator::validate`] for the failure contract.
    pub async fn validate_token(&self, token: &str) -> Result<Principal, AuthError> {
        self.validator.validate(token).await
    }

    // --- password login ---

    /// Check a password and mint a user token.
    pub async fn login(&self, user: UserId, password: &str) -> Result<Token, AuthError> {
        if self.credentials.check_login(user, password).await? {
            self.issuer.user_token(user)
        } else {
            tracing::debug!(%user, "login rejected");
            Err(AuthError::InvalidCredential)
        }
    }

    pub async fn login_by_email(&self, email: &str, password: &str) -> Result<Token, AuthError> {
        match self.credentials.check_login_by_email(email, password).await? {
            Some(user) => self.issuer.user_token(user),
            None => {
                tracing::debug!("login by email rejected");
                Err(AuthError::InvalidCredential)
            }
        }
    }

    // --- authorization grants ---

    /// Grant (or re-grant) `user`'s authorization of `service`. Idempotent;
    /// only services in NORMAL status accept authorizations.
    pub async fn grant_authorization(
        &self,
        user: UserId,
        service: ServiceId,
    ) -> Result<GrantId, AuthError> {
        let info = self
            .credentials
            .service(service)
            .await?
            .ok_or(AuthError::NotFound("service"))?;
        if info.status != ServiceStatus::Normal {
            return Err(AuthError::ServiceNotActive);
        }
        Ok(self.grants.grant(user, service).await?)
    }

    /// Cancel a grant by id. Returns whether a row was affected.
    pub async fn revoke_authorization(&self, id: GrantId) -> Result<bool, AuthError> {
        Ok(self.grants.revoke(id).await?)
    }

    /// Cancel the grant of a (user, service) pair. Returns whether a row was
    /// affected.
    pub async fn revoke_authorization_for(
        &self,
        user: UserId,
        service: ServiceId,
    ) -> Result<bool, AuthError> {
        Ok(self.grants.revoke_pair(user, service).await?)
    }

    pub async fn get_authorization_status(
        &self,
        user: UserId,
        service: ServiceId,
    ) -> Result<AuthorizationStatus, AuthError> {
        Ok(self.grants.status(user, service).await?)
    }

    pub async fn get_authorization(&self, id: GrantId) -> Result<Option<Grant>, AuthError> {
        Ok(self.grants.get(id).await?)
    }

    /// A user's own grants; cancelled ones are hidden.
    pub async fn list_authorizations(
        &self,
        user: UserId,
        begin: usize,
        count: usize,
    ) -> Result<Vec<Grant>, AuthError> {
        Ok(self.grants.list_for_user(user, begin, count).await?)
    }

    /// Every grant a service ever received, cancelled ones included.
    pub async fn list_service_authorizations(
        &self,
        service: ServiceId,
        begin: usize,
        count: usize,
    ) -> Result<Vec<Grant>, AuthError> {
        Ok(self.grants.list_for_service(service, begin, count).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn service_with_directory() -> (SsoService, Arc<MemoryDirectory>) {
        let dir = Arc::new(MemoryDirectory::new());
        let sso = SsoService::new(
            SsoConfig {
                signing_secret: Some("facade tests".into()),
            },
            dir.clone(),
            Arc::new(MemoryGrantStore::new()),
        );
        (sso, dir)
    }

    #[tokio::test]
    async fn test_login_then_validate() {
        let (sso, dir) = service_with_directory().await;
        let id = dir.create_user("alice", "hunter2").await.unwrap();

        assert!(matches!(
            sso.login(id, "wrong").await,
            Err(AuthError::InvalidCredential)
        ));

        let token = sso.login(id, "hunter2").await.unwrap();
        assert!(matches!(
            sso.validate_token(&token.token).await.unwrap(),
            Principal::User(user) if user.id == id
        ));
    }

    #[tokio::test]
    async fn test_login_by_email() {
        let (sso, dir) = service_with_directory().await;
        let id = dir.create_user("alice", "hunter2").await.unwrap();
        dir.add_email(id, "alice@example.com").await;

        let token = sso
            .login_by_email("alice@example.com", "hunter2")
            .await
            .unwrap();
        assert!(matches!(
            sso.validate_token(&token.token).await.unwrap(),
            Principal::User(user) if user.id == id
        ));
        assert!(matches!(
            sso.login_by_email("alice@example.com", "nope").await,
            Err(AuthError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn test_grant_checks_the_service_first() {
        let (sso, dir) = service_with_directory().await;
        let user = dir.create_user("alice", "hunter2").await.unwrap();

        assert!(matches!(
            sso.grant_authorization(user, ServiceId(9)).await,
            Err(AuthError::NotFound("service"))
        ));

        let owner = dir.create_user("owner", "pw").await.unwrap();
        let service = dir.create_service("wiki", "the wiki", owner).await.unwrap();
        // still PENDING
        assert!(matches!(
            sso.grant_authorization(user, service).await,
            Err(AuthError::ServiceNotActive)
        ));

        dir.set_service_status(service, ServiceStatus::Normal).await;
        let grant = sso.grant_authorization(user, service).await.unwrap();
        assert_eq!(
            sso.get_authorization(grant).await.unwrap().unwrap().user,
            user
        );
        assert_eq!(
            sso.get_authorization_status(user, service).await.unwrap(),
            AuthorizationStatus::Authorized
        );
        assert_eq!(sso.list_authorizations(user, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_then_regrant_round_trip() {
        let (sso, dir) = service_with_directory().await;
        let user = dir.create_user("alice", "hunter2").await.unwrap();
        let owner = dir.create_user("owner", "pw").await.unwrap();
        let service = dir.create_service("wiki", "the wiki", owner).await.unwrap();
        dir.set_service_status(service, ServiceStatus::Normal).await;

        let first = sso.grant_authorization(user, service).await.unwrap();
        assert!(sso.revoke_authorization(first).await.unwrap());
        assert_eq!(
            sso.get_authorization_status(user, service).await.unwrap(),
            AuthorizationStatus::Canceled
        );
        assert!(sso.list_authorizations(user, 0, 10).await.unwrap().is_empty());
        assert_eq!(
            sso.list_service_authorizations(service, 0, 10)
                .await
                .unwrap()
                .len(),
            1
        );

        let again = sso.grant_authorization(user, service).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(
            sso.get_authorization_status(user, service).await.unwrap(),
            AuthorizationStatus::Authorized
        );
    }

    #[tokio::test]
    async fn test_distinct_random_keys_do_not_cross_verify() {
        let dir = Arc::new(MemoryDirectory::new());
        let id = dir.create_user("alice", "hunter2").await.unwrap();

        let a = SsoService::new(
            SsoConfig::default(),
            dir.clone(),
            Arc::new(MemoryGrantStore::new()),
        );
        let b = SsoService::new(
            SsoConfig::default(),
            dir.clone(),
            Arc::new(MemoryGrantStore::new()),
        );

        let token = a.issue_user_token(id).unwrap();
        assert!(a.validate_token(&token.token).await.is_ok());
        assert!(matches!(
            b.validate_token(&token.token).await,
            Err(AuthError::InvalidCredential)
        ));
    }
}
