//! Single-use refresh tokens.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;
use time::OffsetDateTime;

use crate::claims::UserIdentity;

/// Lifetime of an unredeemed refresh token.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);

struct RefreshGrant {
    user: UserIdentity,
    expires_at: OffsetDateTime,
}

/// In-memory refresh token registry.
///
/// Each token is redeemable once; redeeming removes it.
pub struct RefreshTokenStore {
    grants: DashMap<String, RefreshGrant>,
    ttl: Duration,
}

impl Default for RefreshTokenStore {
    fn default() -> Self {
        Self::new(REFRESH_TOKEN_TTL)
    }
}

impl RefreshTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            grants: DashMap::new(),
            ttl,
        }
    }

    /// Issues a new opaque token for `user`.
    pub fn issue(&self, user: &UserIdentity) -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.grants.insert(
            token.clone(),
            RefreshGrant {
                user: user.clone(),
                expires_at: OffsetDateTime::now_utc() + self.ttl,
            },
        );
        token
    }

    /// Consumes `token`. Returns `None` for unknown, used or expired tokens.
    pub fn redeem(&self, token: &str) -> Option<UserIdentity> {
        let (_, grant) = self.grants.remove(token)?;
        if grant.expires_at <= OffsetDateTime::now_utc() {
            tracing::debug!(user = %grant.user.id, "refresh token expired");
            return None;
        }
        Some(grant.user)
    }

    pub fn cleanup_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.grants.len();
        self.grants.retain(|_, grant| grant.expires_at > now);
        before.saturating_sub(self.grants.len())
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
