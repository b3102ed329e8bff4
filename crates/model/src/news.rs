//! News digest artifact.

use crate::Symbol;
use serde::{Deserialize, Serialize};

/// Market-wide risk sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    RiskOn,
    Neutral,
    RiskOff,
}

impl Sentiment {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RiskOn => "RISK_ON",
            Self::Neutral => "NEUTRAL",
            Self::RiskOff => "RISK_OFF",
        }
    }
}

/// Digest of the session's news flow.
///
/// Digests are additive within a trading day: merging a newer digest never
/// deletes facts from an earlier one; the newer digest wins on sentiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDigest {
    /// Production timestamp (ms).
    pub produced_at_ms: i64,
    /// Headline-level events collected so far today.
    pub key_events: Vec<String>,
    /// Current overall sentiment.
    pub sentiment: Sentiment,
    /// Symbols the events touch.
    pub affected_symbols: Vec<Symbol>,
}

impl NewsDigest {
    /// Empty neutral digest.
    pub fn empty(produced_at_ms: i64) -> Self {
        Self {
            produced_at_ms,
            key_events: Vec::new(),
            sentiment: Sentiment::Neutral,
            affected_symbols: Vec::new(),
        }
    }

    /// Merge a newer digest into this one, additively.
    ///
    /// Events and affected symbols are unioned preserving first-seen order;
    /// sentiment follows whichever digest was produced later.
    pub fn merge_from(&mut self, newer: &NewsDigest) {
        for event in &newer.key_events {
            if !self.key_events.contains(event) {
                self.key_events.push(event.clone());
            }
        }
        for symbol in &newer.affected_symbols {
            if !self.affected_symbols.contains(symbol) {
                self.affected_symbols.push(symbol.clone());
            }
        }
        if newer.produced_at_ms >= self.produced_at_ms {
            self.sentiment = newer.sentiment;
            self.produced_at_ms = newer.produced_at_ms;
        }
    }

    /// Whether the digest invalidates a position in `symbol` for the given
    /// long/short orientation.
    pub fn invalidates(&self, symbol: &Symbol, is_long: bool) -> bool {
        let adverse = match self.sentiment {
            Sentiment::RiskOff => is_long,
            Sentiment::RiskOn => !is_long,
            Sentiment::Neutral => false,
        };
        adverse && self.affected_symbols.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_additive() {
        let mut digest = NewsDigest {
            produced_at_ms: 1_000,
            key_events: vec!["RBI holds rates".into()],
            sentiment: Sentiment::Neutral,
            affected_symbols: vec![Symbol::new("NSE:HDFCBANK-EQ")],
        };
        let newer = NewsDigest {
            produced_at_ms: 2_000,
            key_events: vec!["RBI holds rates".into(), "Crude spikes 4%".into()],
            sentiment: Sentiment::RiskOff,
            affected_symbols: vec![Symbol::new("NSE:ONGC-EQ")],
        };

        digest.merge_from(&newer);

        assert_eq!(digest.key_events.len(), 2);
        assert_eq!(digest.affected_symbols.len(), 2);
        assert_eq!(digest.sentiment, Sentiment::RiskOff);
        assert_eq!(digest.produced_at_ms, 2_000);
    }

    #[test]
    fn test_older_digest_does_not_override_sentiment() {
        let mut digest = NewsDigest {
            produced_at_ms: 2_000,
            key_events: vec![],
            sentiment: Sentiment::RiskOff,
            affected_symbols: vec![],
        };
        let older = NewsDigest {
            produced_at_ms: 1_000,
            key_events: vec!["stale".into()],
            sentiment: Sentiment::RiskOn,
            affected_symbols: vec![],
        };

        digest.merge_from(&older);

        // Facts are kept, sentiment is not rolled back.
        assert_eq!(digest.key_events.len(), 1);
        assert_eq!(digest.sentiment, Sentiment::RiskOff);
    }

    #[test]
    fn test_invalidation_is_direction_aware() {
        let symbol = Symbol::new("NSE:TCS-EQ");
        let digest = NewsDigest {
            produced_at_ms: 0,
            key_events: vec![],
            sentiment: Sentiment::RiskOff,
            affected_symbols: vec![symbol.clone()],
        };
        assert!(digest.invalidates(&symbol, true));
        assert!(!digest.invalidates(&symbol, false));
        assert!(!digest.invalidates(&Symbol::new("NSE:INFY-EQ"), true));
    }
}
