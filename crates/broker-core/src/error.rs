//! Broker port error taxonomy.

use thiserror::Error;

/// Tagged failures surfaced by any broker adapter.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Rate limit window exhausted; retry after the given delay.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before retrying.
        retry_after_ms: u64,
    },

    /// Access token no longer valid; the token lifecycle must refresh.
    #[error("auth token expired or invalid")]
    AuthExpired,

    /// Upstream service failure (5xx, malformed payloads on their side).
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Symbol unknown to the broker.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Broker rejected the request with a business-level code.
    #[error("broker rejected ({code}): {message}")]
    Rejected {
        /// Broker error code (e.g. the -50 class).
        code: i32,
        /// Broker-supplied message.
        message: String,
    },

    /// Request deadline elapsed.
    #[error("request timeout")]
    Timeout,

    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Referenced order is unknown to the broker.
    #[error("unknown order id: {0}")]
    UnknownOrder(String),
}

impl BrokerError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout | Self::Transport(_) | Self::Upstream(_)
        )
    }

    /// Whether this failure is a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// The retry-after hint, when the error carries one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(BrokerError::Timeout.is_retryable());
        assert!(BrokerError::RateLimited { retry_after_ms: 10 }.is_retryable());
        assert!(!BrokerError::AuthExpired.is_retryable());
        assert!(!BrokerError::InvalidSymbol("X".into()).is_retryable());
        assert!(!BrokerError::Rejected { code: -50, message: "bad".into() }.is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        assert_eq!(
            BrokerError::RateLimited { retry_after_ms: 250 }.retry_after_ms(),
            Some(250)
        );
        assert_eq!(BrokerError::Timeout.retry_after_ms(), None);
    }
}
