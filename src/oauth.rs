//! The OAuth delegation flow: code exchange, service-initiated issuance,
//! refresh, status query and scoped user-info disclosure.
//!
//! Issuance never consults the grant: a service can always obtain a token
//! pair for a consenting (or named) user. The grant's status only decides
//! which disclosure tier applies when the access token is cashed in.

use crate::SsoService;
use crate::error::AuthError;
use crate::model::{
    AuthorizationStatus, BasicUserInfo, ServiceId, ServicePermission, UserFull, UserId,
};
use crate::principal::Principal;
use crate::token::{OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS, OAUTH_REFRESH_TOKEN_VALIDITY_SECS};
use chrono::Duration;
use serde::{Deserialize, Serialize};

const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Access/refresh pair returned by both issuance paths. Expiries in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAndRefreshToken {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_token_expires_in: i64,
    pub refresh_token_expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Which projection of the user the service's tier allowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UserInfoResponse {
    Full(UserFull),
    Basic(BasicUserInfo),
}

impl SsoService {
    /// Exchange a service token plus a user's authorization code for an
    /// access/refresh pair.
    ///
    /// The service token proves who is asking, the code proves which user
    /// consented. Succeeds whatever the grant's status is; the grant only
    /// gates later disclosure.
    pub async fn exchange_code_for_tokens(
        &self,
        service_token: &str,
        oauth_code: &str,
        validity: Option<Duration>,
    ) -> Result<AccessAndRefreshToken, AuthError> {
        let Principal::Service(service) = self.validator.validate(service_token).await? else {
            return Err(AuthError::InvalidCredential);
        };
        let Principal::OAuthCode { user } = self.validator.validate(oauth_code).await? else {
            return Err(AuthError::InvalidCredential);
        };
        self.mint_token_pair(service.id, user, validity)
    }

    /// Service-initiated issuance: same pair, from a bare user id instead of
    /// a code.
    pub async fn issue_tokens_for_user(
        &self,
        service_token: &str,
        user: UserId,
        validity: Option<Duration>,
    ) -> Result<AccessAndRefreshToken, AuthError> {
        let Principal::Service(service) = self.validator.validate(service_token).await? else {
            return Err(AuthError::InvalidCredential);
        };
        self.mint_token_pair(service.id, user, validity)
    }

    // both issuance paths land here
    fn mint_token_pair(
        &self,
        service: ServiceId,
        user: UserId,
        validity: Option<Duration>,
    ) -> Result<AccessAndRefreshToken, AuthError> {
        let access_secs =
            validity.map_or(OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS, |v| v.num_seconds());
        let access = self.issuer.oauth_access_token(service, user, validity)?;
        let refresh = self.issuer.oauth_refresh_token(service, user)?;
        tracing::debug!(%service, %user, "issued oauth token pair");
        Ok(AccessAndRefreshToken {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            access_token_expires_in: access_secs,
            refresh_token_expires_in: OAUTH_REFRESH_TOKEN_VALIDITY_SECS,
        })
    }

    /// Mint a fresh access token from a refresh token. The refresh token is
    /// not rotated and stays usable until it expires or the service secret
    /// is revoked.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        validity: Option<Duration>,
    ) -> Result<AccessToken, AuthError> {
        let Principal::OAuthRefresh { user, service } =
            self.validator.validate(refresh_token).await?
        else {
            return Err(AuthError::InvalidCredential);
        };
        let expires_in =
            validity.map_or(OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS, |v| v.num_seconds());
        let access = self.issuer.oauth_access_token(service.id, user, validity)?;
        Ok(AccessToken {
            access_token: access.token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in,
        })
    }

    /// The delegating user's current authorization status towards the
    /// service the access token is scoped to.
    pub async fn authorization_status(
        &self,
        access_token: &str,
    ) -> Result<AuthorizationStatus, AuthError> {
        let Principal::OAuthAccess { user, service } =
            self.validator.validate(access_token).await?
        else {
            return Err(AuthError::InvalidCredential);
        };
        Ok(self.grants.status(user, service.id).await?)
    }

    /// Disclose the delegating user according to the service's configured
    /// tier for the grant's current status: NONE reads as the user not
    /// existing, BASIC yields the restricted projection, ALL the full one.
    pub async fn user_info_via_access_token(
        &self,
        access_token: &str,
    ) -> Result<UserInfoResponse, AuthError> {
        let Principal::OAuthAccess { user, service } =
            self.validator.validate(access_token).await?
        else {
            return Err(AuthError::InvalidCredential);
        };

        let tier = match self.grants.get_pair(user, service.id).await? {
            None => service.unauthorized,
            Some(grant) if grant.cancelled => service.cancel_authorization,
            Some(_) => service.authorized,
        };

        match tier {
            ServicePermission::None => Err(AuthError::NotFound("user")),
            ServicePermission::Basic => {
                let full = self
                    .credentials
                    .user_full(user)
                    .await?
                    .ok_or(AuthError::NotFound("user"))?;
                Ok(UserInfoResponse::Basic(full.to_basic()))
            }
            ServicePermission::All => {
                let full = self
                    .credentials
                    .user_full(user)
                    .await?
                    .ok_or(AuthError::NotFound("user"))?;
                Ok(UserInfoResponse::Full(full))
            }
        }
    }
}
