//! Tagged stage outputs and the shared session state.

use crate::{ApprovedOrder, Candidate, DayReport, NewsDigest, Regime, StockSignal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance tag carried by stage outputs so downstream stages and the
/// post-trade analyst can attribute decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedBy {
    /// Workflow name.
    pub workflow: String,
    /// Stage name within the workflow.
    pub stage: String,
    /// Run the artifact was produced in.
    pub run_id: String,
}

/// A typed record produced by a stage.
///
/// Adjacently tagged so every variant (including sequences) serializes with
/// an explicit discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Artifact {
    /// Market regime classification.
    Regime(Regime),
    /// Per-analyst stock signals.
    Signals(Vec<StockSignal>),
    /// Aggregated trade candidates.
    Candidates(Vec<Candidate>),
    /// Risk-sized approved orders.
    ApprovedOrders(Vec<ApprovedOrder>),
    /// News digest for the trading day.
    NewsDigest(NewsDigest),
    /// End-of-day report.
    DayReport(DayReport),
    /// Parallel-group output: member stage name -> member artifact.
    Group(BTreeMap<String, Artifact>),
    /// Free-text stage output.
    Report(String),
    /// Structured summary without a first-class artifact type
    /// (execution and monitoring summaries).
    Json(serde_json::Value),
    /// Output of a tolerated failed stage.
    Null,
}

impl Artifact {
    /// Candidates payload, if this artifact carries one.
    pub fn as_candidates(&self) -> Option<&[Candidate]> {
        match self {
            Self::Candidates(c) => Some(c),
            _ => None,
        }
    }

    /// Approved-orders payload, if this artifact carries one.
    pub fn as_approved_orders(&self) -> Option<&[ApprovedOrder]> {
        match self {
            Self::ApprovedOrders(o) => Some(o),
            _ => None,
        }
    }

    /// Regime payload, if this artifact carries one.
    pub fn as_regime(&self) -> Option<&Regime> {
        match self {
            Self::Regime(r) => Some(r),
            _ => None,
        }
    }

    /// News-digest payload, if this artifact carries one.
    pub fn as_news_digest(&self) -> Option<&NewsDigest> {
        match self {
            Self::NewsDigest(d) => Some(d),
            _ => None,
        }
    }

    /// Signals payload, if this artifact carries one.
    pub fn as_signals(&self) -> Option<&[StockSignal]> {
        match self {
            Self::Signals(s) => Some(s),
            _ => None,
        }
    }
}

/// Shared mutable mapping visible to every stage in a run.
///
/// Backed by a `BTreeMap` so persisted JSON is deterministic and a
/// store round-trip reproduces the bytes exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(BTreeMap<String, Artifact>);

impl SessionState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a slot.
    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.0.get(key)
    }

    /// Write a slot, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Artifact) -> Option<Artifact> {
        self.0.insert(key.into(), value)
    }

    /// Whether a slot exists.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Artifact)> {
        self.0.iter()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the state has no slots.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RegimeState, Sentiment};
    use rust_decimal_macros::dec;

    #[test]
    fn test_artifact_tagged_serialization() {
        let regime = Regime::new(RegimeState::Calm, dec!(11), dec!(1.0), 0).unwrap();
        let json = serde_json::to_string(&Artifact::Regime(regime)).unwrap();
        assert!(json.contains("\"kind\":\"Regime\""));

        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert!(back.as_regime().is_some());
    }

    #[test]
    fn test_session_state_roundtrip_is_byte_identical() {
        let mut state = SessionState::new();
        state.set(
            "news_digest",
            Artifact::NewsDigest(NewsDigest {
                produced_at_ms: 42,
                key_events: vec!["event".into()],
                sentiment: Sentiment::Neutral,
                affected_symbols: vec![],
            }),
        );
        state.set("note", Artifact::Report("hello".into()));

        let first = serde_json::to_vec(&state).unwrap();
        let reloaded: SessionState = serde_json::from_slice(&first).unwrap();
        let second = serde_json::to_vec(&reloaded).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_group_artifact_nesting() {
        let mut members = BTreeMap::new();
        members.insert("technical".to_string(), Artifact::Report("ok".into()));
        members.insert("flow".to_string(), Artifact::Null);
        let group = Artifact::Group(members);

        let json = serde_json::to_string(&group).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(group, back);
    }
}
