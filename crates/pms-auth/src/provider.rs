//! Issues access/refresh token pairs.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::claims::{AccessTokenClaims, UserIdentity};
use crate::error::JwtError;
use crate::jwt::JwtService;
use crate::refresh::RefreshTokenStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDto {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

pub struct TokenProvider {
    jwt: JwtService,
    refresh: RefreshTokenStore,
}

impl TokenProvider {
    pub fn new(jwt: JwtService, refresh: RefreshTokenStore) -> Self {
        Self { jwt, refresh }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh
    }

    pub fn generate(&self, user: &UserIdentity) -> Result<TokenDto, JwtError> {
        let now = OffsetDateTime::now_utc();
        let expires = now + Duration::minutes(self.jwt.expiration_minutes());
        let claims = AccessTokenClaims::for_user(
            user,
            self.jwt.issuer(),
            self.jwt.audience(),
            now.unix_timestamp(),
            expires.unix_timestamp(),
        );

        let access_token = self.jwt.encode(&claims)?;
        let refresh_token = self.refresh.issue(user);
        tracing::info!(user = %user.id, email = %user.email, "token generated");

        Ok(TokenDto {
            access_token,
            refresh_token,
            expires,
        })
    }

    /// Exchanges a refresh token for a new pair. `None` when the token is
    /// unknown, already used or expired.
    pub fn refresh(&self, refresh_token: &str) -> Result<Option<TokenDto>, JwtError> {
        let Some(user) = self.refresh.redeem(refresh_token) else {
            return Ok(None);
        };
        tracing::info!(user = %user.id, "refreshing token");
        self.generate(&user).map(Some)
    }

    pub fn validate(&self, access_token: &str) -> Result<AccessTokenClaims, JwtError> {
        self.jwt.decode(access_token)
    }
}
