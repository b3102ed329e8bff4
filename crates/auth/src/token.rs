//! In-memory token material.

use secrecy::{ExposeSecret, SecretString};

/// Broker access/refresh token pair.
///
/// Secret material is wrapped in [`SecretString`] so it cannot leak through
/// `Debug`/`Display` and is zeroed on drop.
#[derive(Clone)]
pub struct Token {
    access: SecretString,
    refresh: Option<SecretString>,
    /// When the token was issued (ms).
    pub acquired_at_ms: i64,
    /// Hard expiry (ms).
    pub expires_at_ms: i64,
    /// Application id the token was issued to.
    pub app_id: String,
    /// Broker user id, when known.
    pub user_id: Option<String>,
}

impl Token {
    /// Assemble a token from raw parts.
    pub fn new(
        access: impl Into<String>,
        refresh: Option<String>,
        acquired_at_ms: i64,
        expires_at_ms: i64,
        app_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            access: SecretString::from(access.into()),
            refresh: refresh.map(SecretString::from),
            acquired_at_ms,
            expires_at_ms,
            app_id: app_id.into(),
            user_id,
        }
    }

    /// Expose the access token for request headers.
    ///
    /// Never log or display the return value.
    pub fn expose_access(&self) -> &str {
        self.access.expose_secret()
    }

    /// Expose the refresh token, when present.
    pub fn expose_refresh(&self) -> Option<&str> {
        self.refresh.as_ref().map(|s| s.expose_secret())
    }

    /// Whether refresh material is available.
    pub fn has_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    /// Local expiry check with a safety skew.
    ///
    /// A `false` here is necessary but not sufficient for validity; the
    /// probe recency requirement lives in the manager.
    pub fn is_expired(&self, now_ms: i64, skew_ms: i64) -> bool {
        now_ms >= self.expires_at_ms - skew_ms
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .field("acquired_at_ms", &self.acquired_at_ms)
            .field("expires_at_ms", &self.expires_at_ms)
            .field("app_id", &self.app_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_with_skew() {
        let token = Token::new("a", None, 0, 10_000, "APP", None);
        assert!(!token.is_expired(5_000, 1_000));
        // Inside the skew margin counts as expired.
        assert!(token.is_expired(9_500, 1_000));
        assert!(token.is_expired(11_000, 0));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = Token::new("super-secret", Some("refresh-secret".into()), 0, 1, "APP", None);
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
