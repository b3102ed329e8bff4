//! Exchange-qualified symbol identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-qualified instrument identifier, e.g. `NSE:RELIANCE-EQ`.
///
/// Opaque to the core: compared by exact string, never parsed apart from
/// the optional exchange prefix used for display grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The full identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The exchange prefix, if the identifier carries one.
    pub fn exchange(&self) -> Option<&str> {
        self.0.split_once(':').map(|(ex, _)| ex)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_string_comparison() {
        assert_eq!(Symbol::new("NSE:RELIANCE-EQ"), Symbol::from("NSE:RELIANCE-EQ"));
        assert_ne!(Symbol::new("NSE:RELIANCE-EQ"), Symbol::new("BSE:RELIANCE-EQ"));
    }

    #[test]
    fn test_exchange_prefix() {
        assert_eq!(Symbol::new("NSE:TCS-EQ").exchange(), Some("NSE"));
        assert_eq!(Symbol::new("TCS").exchange(), None);
    }
}
