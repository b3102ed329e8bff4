//! The trigger table.

use crate::workflows;
use chrono::{NaiveTime, Timelike};

/// When a workflow fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// Once per trading day at the given local time.
    Daily(NaiveTime),
    /// Every `interval_min` minutes from `start` through `end` inclusive.
    Every {
        start: NaiveTime,
        end: NaiveTime,
        interval_min: u32,
    },
}

/// One row of the trigger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub workflow: String,
    pub kind: TriggerKind,
}

impl TriggerSpec {
    /// Daily trigger.
    pub fn daily(workflow: &str, hour: u32, minute: u32) -> Self {
        Self {
            workflow: workflow.to_string(),
            kind: TriggerKind::Daily(NaiveTime::from_hms_opt(hour, minute, 0).unwrap()),
        }
    }

    /// Interval trigger.
    pub fn every(workflow: &str, start: (u32, u32), end: (u32, u32), interval_min: u32) -> Self {
        Self {
            workflow: workflow.to_string(),
            kind: TriggerKind::Every {
                start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
                end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
                interval_min: interval_min.max(1),
            },
        }
    }

    /// Whether the trigger is due at the given local minute.
    pub fn is_due(&self, at: NaiveTime) -> bool {
        let minute = at.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(at);
        match &self.kind {
            TriggerKind::Daily(time) => minute == *time,
            TriggerKind::Every {
                start,
                end,
                interval_min,
            } => {
                if minute < *start || minute > *end {
                    return false;
                }
                let elapsed = (minute - *start).num_minutes();
                elapsed % (*interval_min as i64) == 0
            }
        }
    }
}

/// The production trigger table (venue-local times).
///
/// | workflow            | trigger                      |
/// |---------------------|------------------------------|
/// | intraday-analysis   | 09:00 daily                  |
/// | order-execution     | 09:15 daily                  |
/// | position-monitoring | 09:30-15:20, every 20 min    |
/// | news-digest         | 09:00-16:00, hourly          |
/// | post-trade-analysis | 16:00 daily                  |
pub fn default_triggers() -> Vec<TriggerSpec> {
    vec![
        TriggerSpec::daily(workflows::INTRADAY_ANALYSIS, 9, 0),
        TriggerSpec::daily(workflows::ORDER_EXECUTION, 9, 15),
        TriggerSpec::every(workflows::POSITION_MONITORING, (9, 30), (15, 20), 20),
        TriggerSpec::every(workflows::NEWS_DIGEST, (9, 0), (16, 0), 60),
        TriggerSpec::daily(workflows::POST_TRADE_ANALYSIS, 16, 0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_daily_due_exactly_once() {
        let spec = TriggerSpec::daily("intraday-analysis", 9, 0);
        assert!(spec.is_due(at(9, 0)));
        assert!(!spec.is_due(at(9, 1)));
        assert!(!spec.is_due(at(8, 59)));
    }

    #[test]
    fn test_monitoring_cadence() {
        let spec = TriggerSpec::every("position-monitoring", (9, 30), (15, 20), 20);
        assert!(spec.is_due(at(9, 30)));
        assert!(spec.is_due(at(9, 50)));
        assert!(spec.is_due(at(10, 10)));
        assert!(spec.is_due(at(15, 10)));
        assert!(!spec.is_due(at(9, 40)));
        assert!(!spec.is_due(at(9, 20)));
        assert!(!spec.is_due(at(15, 30)));
    }

    #[test]
    fn test_hourly_news_window() {
        let spec = TriggerSpec::every("news-digest", (9, 0), (16, 0), 60);
        assert!(spec.is_due(at(9, 0)));
        assert!(spec.is_due(at(12, 0)));
        assert!(spec.is_due(at(16, 0)));
        assert!(!spec.is_due(at(16, 30)));
        assert!(!spec.is_due(at(8, 0)));
    }

    #[test]
    fn test_seconds_are_ignored() {
        let spec = TriggerSpec::daily("post-trade-analysis", 16, 0);
        let with_seconds = NaiveTime::from_hms_opt(16, 0, 42).unwrap();
        assert!(spec.is_due(with_seconds));
    }
}
