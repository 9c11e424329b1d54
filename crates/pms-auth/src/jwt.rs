//! HS256 JWT encoding and validation.
//!
//! ## Example
//!
//! ```ignore
//! use pms_auth::{JwtService, JwtSettings};
//!
//! let jwt = JwtService::new(&settings)?;
//! let token = jwt.encode(&claims)?;
//! let claims = jwt.decode(&token)?;
//! ```

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::claims::AccessTokenClaims;
use crate::error::JwtError;

/// Shortest accepted HMAC secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_expiration_minutes")]
    pub expiration_minutes: i64,
}

fn default_issuer() -> String {
    "pms".to_string()
}

fn default_audience() -> String {
    "pms-clients".to_string()
}

fn default_expiration_minutes() -> i64 {
    10
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: default_issuer(),
            audience: default_audience(),
            expiration_minutes: default_expiration_minutes(),
        }
    }
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "auth.secret must be at least {MIN_SECRET_LEN} bytes"
            ));
        }
        if self.expiration_minutes <= 0 {
            return Err("auth.expiration_minutes must be greater than 0".into());
        }
        Ok(())
    }
}

/// Service for encoding and validating access tokens.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    expiration_minutes: i64,
}

impl JwtService {
    pub fn new(settings: &JwtSettings) -> Result<Self, JwtError> {
        settings.validate().map_err(JwtError::invalid_key)?;
        let secret = settings.secret.as_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            expiration_minutes: settings.expiration_minutes,
        })
    }

    pub fn encode(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Validates signature, issuer, audience and expiry.
    pub fn decode(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;

        Ok(decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?.claims)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn expiration_minutes(&self) -> i64 {
        self.expiration_minutes
    }
}
