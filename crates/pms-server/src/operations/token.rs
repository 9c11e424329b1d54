//! Token issuance. Never cached.

use async_trait::async_trait;
use pms_api::ApiError;
use pms_auth::{TokenDto, UserIdentity};
use pms_cache::{Handler, Request};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::AppServices;

/// Issues a token pair for the described user.
#[derive(Debug, Clone)]
pub struct GenerateToken {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub permissions: Vec<String>,
    pub roles: Vec<String>,
}

impl Request for GenerateToken {
    type Response = TokenDto;

    fn name(&self) -> &'static str {
        "GenerateToken"
    }
}

#[async_trait]
impl Handler<GenerateToken> for AppServices {
    type Error = ApiError;

    async fn handle(&self, request: &GenerateToken, _cancel: &CancellationToken) -> Result<TokenDto, ApiError> {
        tracing::info!(email = %request.email, "generating token");
        let user = UserIdentity {
            id: request.id,
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            email: request.email.clone(),
            permissions: request.permissions.clone(),
            roles: request.roles.clone(),
        };
        Ok(self.tokens.generate(&user)?)
    }
}

/// Exchanges a refresh token for a new pair. The old refresh token is spent.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub refresh_token: String,
}

impl Request for RefreshToken {
    type Response = TokenDto;

    fn name(&self) -> &'static str {
        "RefreshToken"
    }
}

#[async_trait]
impl Handler<RefreshToken> for AppServices {
    type Error = ApiError;

    async fn handle(&self, request: &RefreshToken, _cancel: &CancellationToken) -> Result<TokenDto, ApiError> {
        self.tokens
            .refresh(&request.refresh_token)?
            .ok_or_else(|| ApiError::not_found("Refresh token doesn't exist or has expired"))
    }
}
