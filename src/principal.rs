//! Token validation and principal resolution.
//!
//! The codec already rejects bad signatures and expired tokens; this layer
//! dispatches on the type claim and re-checks the subject's revocation state
//! against the credential store, fresh on every call.

use crate::error::AuthError;
use crate::model::{ServiceId, ServiceInfo, UserId, UserInfo};
use crate::store::CredentialStore;
use crate::token::{Claims, TokenCodec, TokenType};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The verified identity behind a token.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    User(UserInfo),
    Service(ServiceInfo),
    /// Consent proof minted by a logged-in user. Short-lived, carries no
    /// revocation state and is only re-validated by identity at exchange.
    OAuthCode { user: UserId },
    OAuthAccess { user: UserId, service: ServiceInfo },
    OAuthRefresh { user: UserId, service: ServiceInfo },
}

/// Verifies tokens and resolves them to principals.
pub struct TokenValidator {
    codec: Arc<TokenCodec>,
    credentials: Arc<dyn CredentialStore>,
}

impl TokenValidator {
    pub fn new(codec: Arc<TokenCodec>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { codec, credentials }
    }

    /// Resolve a token to a principal.
    ///
    /// Every verification failure — bad signature, expiry, unknown type tag,
    /// missing claim, unknown subject, revoked-by-timestamp — surfaces as
    /// [`AuthError::InvalidCredential`], indistinguishably. Store transport
    /// failures are the one exception: they propagate as
    /// [`AuthError::Storage`]. Read-only apart from the store lookups.
    pub async fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self
            .codec
            .verify(token)
            .ok_or(AuthError::InvalidCredential)?;
        tracing::debug!(token_type = ?claims.token_type, "checking token");

        match claims.token_type {
            TokenType::User => {
                let id = UserId(claims.id.ok_or(AuthError::InvalidCredential)?);
                let (user, last_change) = self
                    .credentials
                    .user_with_last_password_change(id)
                    .await?
                    .ok_or(AuthError::InvalidCredential)?;
                if issued_before(claims.iat, last_change) {
                    tracing::debug!(user = %id, %last_change, iat = claims.iat,
                        "user token issued before password change");
                    return Err(AuthError::InvalidCredential);
                }
                Ok(Principal::User(user))
            }
            TokenType::Service => {
                let id = ServiceId(claims.id.ok_or(AuthError::InvalidCredential)?);
                let service = self.resolve_unrevoked_service(id, claims.iat).await?;
                Ok(Principal::Service(service))
            }
            TokenType::OauthCode => {
                let user = UserId(claims.id.ok_or(AuthError::InvalidCredential)?);
                Ok(Principal::OAuthCode { user })
            }
            TokenType::OauthAccessToken => {
                let (user, service) = self.resolve_service_scoped(&claims).await?;
                Ok(Principal::OAuthAccess { user, service })
            }
            TokenType::OauthRefreshToken => {
                let (user, service) = self.resolve_service_scoped(&claims).await?;
                Ok(Principal::OAuthRefresh { user, service })
            }
        }
    }

    /// Shared tail of the access/refresh arms: both carry `service` + `user`
    /// claims and both die with the service's secret.
    async fn resolve_service_scoped(
        &self,
        claims: &Claims,
    ) -> Result<(UserId, ServiceInfo), AuthError> {
        let service_id = ServiceId(claims.service.ok_or(AuthError::InvalidCredential)?);
        let user = UserId(claims.user.ok_or(AuthError::InvalidCredential)?);
        let service = self
            .resolve_unrevoked_service(service_id, claims.iat)
            .await?;
        Ok((user, service))
    }

    async fn resolve_unrevoked_service(
        &self,
        id: ServiceId,
        iat: i64,
    ) -> Result<ServiceInfo, AuthError> {
        let (service, revoked) = self
            .credentials
            .service_with_secret_revoked_time(id)
            .await?
            .ok_or(AuthError::InvalidCredential)?;
        if issued_before(iat, revoked) {
            tracing::debug!(service = %id, %revoked, iat,
                "token issued before service secret revocation");
            return Err(AuthError::InvalidCredential);
        }
        Ok(service)
    }
}

/// Whether a token stamped `iat` predates `cutoff`. `iat` has whole-second
/// precision, so a cutoff inside the issuance second counts as after it.
fn issued_before(iat: i64, cutoff: DateTime<Utc>) -> bool {
    match DateTime::from_timestamp(iat, 0) {
        Some(issued) => cutoff > issued,
        // unrepresentable iat: treat as arbitrarily old
        None => true,
    }
}
