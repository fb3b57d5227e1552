//! OAuth2 client-credentials token caching
//!
//! The admin API accepts bearer tokens from the realm's token endpoint.
//! Tokens are cached until shortly before expiry; a safety margin keeps a
//! token from expiring mid-request.

use serde::Deserialize;
use std::time::{Duration, Instant};

/// Tokens are considered expired this long before their actual expiry
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Wire shape of the token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
}

/// A cached access token with its computed expiry instant
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    pub fn new(access_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        }
    }

    /// Whether the token is still usable at `now`, honoring the margin
    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at.saturating_duration_since(now) > EXPIRY_MARGIN
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_valid() {
        let token = CachedToken::new("abc".into(), 300);
        assert!(token.is_valid());
    }

    #[test]
    fn token_inside_margin_is_invalid() {
        let token = CachedToken::new("abc".into(), 300);
        // 20s of lifetime left is inside the 30s margin
        let now = token.expires_at - Duration::from_secs(20);
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn token_outside_margin_is_valid() {
        let token = CachedToken::new("abc".into(), 300);
        let now = token.expires_at - Duration::from_secs(31);
        assert!(token.is_valid_at(now));
    }

    #[test]
    fn zero_lifetime_token_is_invalid() {
        let token = CachedToken::new("abc".into(), 0);
        assert!(!token.is_valid());
    }
}
