//! Signed-token construction: the process-wide codec and the typed issuer.
//!
//! Tokens are self-contained: authenticity is checked from the token bytes
//! plus the shared signing key alone. There is no server-side token registry,
//! so nothing here needs coordination beyond the key itself.

use crate::error::AuthError;
use crate::model::{ServiceId, UserId};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Issuer claim stamped into, and required of, every token. Tokens minted by
/// a differently-keyed authority fail signature verification anyway; this
/// catches same-key deployments that aren't us.
pub const ISSUER: &str = "yasso";

/// Subject claim carried by every token.
const SUBJECT: &str = "Authentication";

pub const USER_TOKEN_VALIDITY_SECS: i64 = 90 * 24 * 60 * 60;
pub const SERVICE_TOKEN_VALIDITY_SECS: i64 = 180 * 24 * 60 * 60;
pub const OAUTH_CODE_VALIDITY_SECS: i64 = 10 * 60;
pub const OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS: i64 = 30 * 24 * 60 * 60;
pub const OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS: i64 = 24 * 60 * 60;
pub const OAUTH_REFRESH_TOKEN_VALIDITY_SECS: i64 = 90 * 24 * 60 * 60;

/// Closed set of token kinds. An unrecognised tag on the wire fails claim
/// deserialisation, which surfaces as an invalid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    User,
    Service,
    OauthCode,
    OauthAccessToken,
    OauthRefreshToken,
}

/// Claim set carried by every token. The integer identifiers are
/// type-dependent; the validator checks the shape per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// User id for USER and OAUTH_CODE tokens, service id for SERVICE tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<i32>,
}

/// A signed bearer token as handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
}

/// HS512 signer/verifier around the process-wide symmetric key.
///
/// Built once at service construction and shared by handle, so tests can run
/// with distinct keys side by side.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    header: Header,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = true;
        validation.required_spec_claims = ["sub", "iat", "exp", "iss"]
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            header: Header::new(Algorithm::HS512),
        }
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        Ok(encode(&self.header, claims, &self.encoding_key).context("failed to sign token")?)
    }

    /// Verify signature, expiry and issuer. Every failure is a soft `None`;
    /// malformed and expired are indistinguishable to the caller.
    pub(crate) fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("token failed verification: {e}");
                None
            }
        }
    }
}

/// Mints the typed tokens. Validity windows are fixed per type, except OAuth
/// access tokens which take a caller-chosen window bounded by
/// [`OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS`].
pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
}

impl TokenIssuer {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    pub fn user_token(&self, user: UserId) -> Result<Token, AuthError> {
        self.mint(
            TokenType::User,
            USER_TOKEN_VALIDITY_SECS,
            Some(user.0),
            None,
            None,
        )
    }

    pub fn service_token(&self, service: ServiceId) -> Result<Token, AuthError> {
        self.mint(
            TokenType::Service,
            SERVICE_TOKEN_VALIDITY_SECS,
            Some(service.0),
            None,
            None,
        )
    }

    /// Consent proof bound to the user alone; any logged-in user can mint one.
    pub fn oauth_code(&self, user: UserId) -> Result<Token, AuthError> {
        self.mint(
            TokenType::OauthCode,
            OAUTH_CODE_VALIDITY_SECS,
            Some(user.0),
            None,
            None,
        )
    }

    /// `validity` defaults to one day; asking for more than the maximum is a
    /// policy violation, not a clamp.
    pub fn oauth_access_token(
        &self,
        service: ServiceId,
        user: UserId,
        validity: Option<Duration>,
    ) -> Result<Token, AuthError> {
        let secs = validity.map_or(OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS, |v| {
            v.num_seconds()
        });
        if secs > OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS {
            return Err(AuthError::ValidityTooLong {
                requested_secs: secs,
                max_secs: OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS,
            });
        }
        self.mint(
            TokenType::OauthAccessToken,
            secs,
            None,
            Some(service.0),
            Some(user.0),
        )
    }

    pub fn oauth_refresh_token(
        &self,
        service: ServiceId,
        user: UserId,
    ) -> Result<Token, AuthError> {
        self.mint(
            TokenType::OauthRefreshToken,
            OAUTH_REFRESH_TOKEN_VALIDITY_SECS,
            None,
            Some(service.0),
            Some(user.0),
        )
    }

    fn mint(
        &self,
        token_type: TokenType,
        validity_secs: i64,
        id: Option<i32>,
        service: Option<i32>,
        user: Option<i32>,
    ) -> Result<Token, AuthError> {
        self.mint_at(token_type, Utc::now(), validity_secs, id, service, user)
    }

    /// Mint with an explicit issuance instant. Internal: the public mints
    /// always stamp now, but revocation-window behaviour is only testable
    /// with a controlled `iat`.
    pub(crate) fn mint_at(
        &self,
        token_type: TokenType,
        issued_at: DateTime<Utc>,
        validity_secs: i64,
        id: Option<i32>,
        service: Option<i32>,
        user: Option<i32>,
    ) -> Result<Token, AuthError> {
        let iat = issued_at.timestamp();
        let claims = Claims {
            sub: SUBJECT.to_owned(),
            token_type,
            iss: ISSUER.to_owned(),
            iat,
            exp: iat + validity_secs,
            id,
            service,
            user,
        };
        Ok(Token {
            token: self.codec.sign(&claims)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> (Arc<TokenCodec>, TokenIssuer) {
        let codec = Arc::new(TokenCodec::new("test signing key"));
        (codec.clone(), TokenIssuer::new(codec))
    }

    #[test]
    fn test_user_token_round_trip() {
        let (codec, issuer) = issuer();
        let token = issuer.user_token(UserId(7)).unwrap();
        let claims = codec.verify(&token.token).unwrap();
        assert_eq!(claims.token_type, TokenType::User);
        assert_eq!(claims.id, Some(7));
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, USER_TOKEN_VALIDITY_SECS);
    }

    #[test]
    fn test_every_type_round_trips_with_its_claim_shape() {
        let (codec, issuer) = issuer();
        let service = ServiceId(9);
        let user = UserId(3);

        let cases = [
            (
                issuer.service_token(service).unwrap(),
                TokenType::Service,
                SERVICE_TOKEN_VALIDITY_SECS,
            ),
            (
                issuer.oauth_code(user).unwrap(),
                TokenType::OauthCode,
                OAUTH_CODE_VALIDITY_SECS,
            ),
            (
                issuer.oauth_access_token(service, user, None).unwrap(),
                TokenType::OauthAccessToken,
                OAUTH_ACCESS_TOKEN_DEFAULT_VALIDITY_SECS,
            ),
            (
                issuer.oauth_refresh_token(service, user).unwrap(),
                TokenType::OauthRefreshToken,
                OAUTH_REFRESH_TOKEN_VALIDITY_SECS,
            ),
        ];

        for (token, expected_type, expected_validity) in cases {
            let claims = codec.verify(&token.token).unwrap();
            assert_eq!(claims.token_type, expected_type);
            assert_eq!(claims.exp - claims.iat, expected_validity);
            match expected_type {
                TokenType::Service => assert_eq!(claims.id, Some(9)),
                TokenType::OauthCode => assert_eq!(claims.id, Some(3)),
                _ => {
                    assert_eq!(claims.service, Some(9));
                    assert_eq!(claims.user, Some(3));
                }
            }
        }
    }

    #[test]
    fn test_access_token_validity_above_cap_is_rejected() {
        let (_, issuer) = issuer();
        let err = issuer
            .oauth_access_token(ServiceId(1), UserId(1), Some(Duration::days(31)))
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::ValidityTooLong {
                max_secs: OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS,
                ..
            }
        ));
    }

    #[test]
    fn test_access_token_validity_at_cap_is_accepted() {
        let (codec, issuer) = issuer();
        let token = issuer
            .oauth_access_token(ServiceId(1), UserId(1), Some(Duration::days(30)))
            .unwrap();
        let claims = codec.verify(&token.token).unwrap();
        assert_eq!(claims.exp - claims.iat, OAUTH_ACCESS_TOKEN_MAX_VALIDITY_SECS);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let (codec, issuer) = issuer();
        let token = issuer.user_token(UserId(1)).unwrap().token;
        let mut tampered = token.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        assert!(codec.verify(&String::from_utf8(tampered).unwrap()).is_none());
    }

    #[test]
    fn test_token_from_another_key_is_rejected() {
        let (_, issuer) = issuer();
        let other = TokenCodec::new("a different key");
        let token = issuer.user_token(UserId(1)).unwrap();
        assert!(other.verify(&token.token).is_none());
    }

    #[test]
    fn test_foreign_issuer_is_rejected_even_with_the_same_key() {
        let (codec, _) = issuer();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: SUBJECT.to_owned(),
            token_type: TokenType::User,
            iss: "somebody else".to_owned(),
            iat: now,
            exp: now + 3600,
            id: Some(1),
            service: None,
            user: None,
        };
        let forged = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test signing key"),
        )
        .unwrap();
        assert!(codec.verify(&forged).is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (codec, issuer) = issuer();
        let stale = Utc::now() - Duration::seconds(USER_TOKEN_VALIDITY_SECS + 3600);
        let token = issuer
            .mint_at(
                TokenType::User,
                stale,
                USER_TOKEN_VALIDITY_SECS,
                Some(1),
                None,
                None,
            )
            .unwrap();
        assert!(codec.verify(&token.token).is_none());
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        // same key, same layout, but a tag outside the closed set
        #[derive(Serialize)]
        struct LooseClaims<'a> {
            sub: &'a str,
            #[serde(rename = "type")]
            token_type: &'a str,
            iss: &'a str,
            iat: i64,
            exp: i64,
            id: i32,
        }
        let (codec, _) = issuer();
        let now = Utc::now().timestamp();
        let claims = LooseClaims {
            sub: SUBJECT,
            token_type: "SUPER_TOKEN",
            iss: ISSUER,
            iat: now,
            exp: now + 3600,
            id: 1,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test signing key"),
        )
        .unwrap();
        assert!(codec.verify(&token).is_none());
    }
}
