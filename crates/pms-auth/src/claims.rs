//! Access token claims.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JwtError;

/// The user a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    /// One entry per granted permission, e.g. `project:read`.
    #[serde(default)]
    pub permission: Vec<String>,
    #[serde(default)]
    pub role: Vec<String>,
    pub iss: String,
    pub aud: String,
    /// Expiration (Unix seconds).
    pub exp: i64,
    /// Issued at (Unix seconds).
    pub iat: i64,
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn for_user(user: &UserIdentity, issuer: &str, audience: &str, iat: i64, exp: i64) -> Self {
        Self {
            sub: user.id.to_string(),
            email: user.email.clone(),
            given_name: user.first_name.clone(),
            family_name: user.last_name.clone(),
            permission: user.permissions.clone(),
            role: user.roles.clone(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp,
            iat,
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permission.iter().any(|p| p == permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.iter().any(|r| r == role)
    }

    /// The subject as a user id.
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| JwtError::invalid_claims(format!("subject is not a user id: {}", self.sub)))
    }

    /// Rebuilds the identity the token was issued for.
    pub fn identity(&self) -> Result<UserIdentity, JwtError> {
        Ok(UserIdentity {
            id: self.user_id()?,
            first_name: self.given_name.clone(),
            last_name: self.family_name.clone(),
            email: self.email.clone(),
            permissions: self.permission.clone(),
            roles: self.role.clone(),
        })
    }
}
