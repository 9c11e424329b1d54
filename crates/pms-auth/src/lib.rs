//! # pms-auth
//!
//! Bearer token support for the project management server.
//!
//! - [`JwtService`] signs and validates HS256 access tokens
//! - [`AccessTokenClaims`] carries the user identity plus one `permission`
//!   entry per granted permission
//! - [`RefreshTokenStore`] holds single-use refresh tokens
//! - [`TokenProvider`] ties the three together for the token endpoints

pub mod claims;
pub mod error;
pub mod jwt;
pub mod provider;
pub mod refresh;

pub use claims::{AccessTokenClaims, UserIdentity};
pub use error::JwtError;
pub use jwt::{JwtService, JwtSettings};
pub use provider::{TokenDto, TokenProvider};
pub use refresh::{REFRESH_TOKEN_TTL, RefreshTokenStore};
