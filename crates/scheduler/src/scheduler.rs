//! The scheduler loop.

use crate::{TradingCalendar, TriggerSpec};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use common::SharedClock;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// What the dispatcher did with a fire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// A run was started.
    Started,
    /// A run of this workflow was already in flight; the trigger is
    /// dropped.
    Overlap,
    /// The dispatcher failed to start the run.
    Failed,
}

/// Starts workflow runs on behalf of the scheduler.
///
/// Dispatch must not block on the run itself; the scheduler owns wall
/// clock, the dispatcher owns workers.
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    /// Begin a run of `workflow` for the trading date `session_id`.
    async fn dispatch(&self, workflow: &str, session_id: &str) -> DispatchResult;

    /// Whether a valid broker token gates open.
    async fn token_valid(&self) -> bool;
}

/// Audit events the scheduler records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Trigger fired and a run started.
    Fired { workflow: String, at: NaiveDateTime },
    /// Trigger dropped because a run was still in flight.
    OverlapDropped { workflow: String, at: NaiveDateTime },
    /// Trigger blocked by an invalid token.
    TokenGateClosed { workflow: String, at: NaiveDateTime },
    /// Dispatch failed outright.
    DispatchFailed { workflow: String, at: NaiveDateTime },
    /// The whole day is skipped (weekend or holiday).
    NonTradingDay { date: NaiveDate },
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Venue-local UTC offset (IST +05:30 by default).
    pub venue_offset: FixedOffset,
    /// How often the loop re-evaluates the clock.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            venue_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap(),
            tick_interval: Duration::from_secs(20),
        }
    }
}

/// Evaluates the trigger table against a single clock.
///
/// The scheduler holds no persistent state: a trigger minute that passes
/// while the process is down is simply never evaluated (no catch-up).
pub struct Scheduler {
    clock: SharedClock,
    calendar: Arc<dyn TradingCalendar>,
    triggers: Vec<TriggerSpec>,
    config: SchedulerConfig,
    /// (workflow, minute) pairs already handled, so a sub-minute tick
    /// interval cannot double-fire.
    fired: Mutex<HashSet<(String, NaiveDateTime)>>,
    events: Mutex<Vec<SchedulerEvent>>,
}

impl Scheduler {
    /// Scheduler over a clock, calendar and trigger table.
    pub fn new(
        clock: SharedClock,
        calendar: Arc<dyn TradingCalendar>,
        triggers: Vec<TriggerSpec>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            clock,
            calendar,
            triggers,
            config,
            fired: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// The audit trail so far.
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().clone()
    }

    /// Evaluate the current clock minute and dispatch due triggers.
    pub async fn tick(&self, dispatcher: &dyn WorkflowDispatcher) -> Vec<SchedulerEvent> {
        let local = self.clock.now_local(self.config.venue_offset);
        let date = local.date_naive();
        let minute = local
            .naive_local()
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or_else(|| local.naive_local());

        let mut new_events = Vec::new();

        if !self.calendar.is_trading_day(date) {
            let event = SchedulerEvent::NonTradingDay { date };
            // Record the skip once per day.
            if !self.events.lock().contains(&event) {
                info!(%date, "non-trading day, triggers gated");
                new_events.push(event);
            }
            self.record(&new_events);
            return new_events;
        }

        let session_id = date.format("%Y-%m-%d").to_string();

        for trigger in &self.triggers {
            if !trigger.is_due(minute.time()) {
                continue;
            }
            let key = (trigger.workflow.clone(), minute);
            {
                let mut fired = self.fired.lock();
                if fired.contains(&key) {
                    continue;
                }
                fired.insert(key);
            }

            if !dispatcher.token_valid().await {
                warn!(workflow = %trigger.workflow, "token gate closed, trigger dropped");
                new_events.push(SchedulerEvent::TokenGateClosed {
                    workflow: trigger.workflow.clone(),
                    at: minute,
                });
                continue;
            }

            match dispatcher.dispatch(&trigger.workflow, &session_id).await {
                DispatchResult::Started => {
                    info!(workflow = %trigger.workflow, at = %minute, "trigger fired");
                    new_events.push(SchedulerEvent::Fired {
                        workflow: trigger.workflow.clone(),
                        at: minute,
                    });
                }
                DispatchResult::Overlap => {
                    warn!(workflow = %trigger.workflow, at = %minute, "run in flight, trigger dropped");
                    new_events.push(SchedulerEvent::OverlapDropped {
                        workflow: trigger.workflow.clone(),
                        at: minute,
                    });
                }
                DispatchResult::Failed => {
                    warn!(workflow = %trigger.workflow, at = %minute, "dispatch failed");
                    new_events.push(SchedulerEvent::DispatchFailed {
                        workflow: trigger.workflow.clone(),
                        at: minute,
                    });
                }
            }
        }

        self.record(&new_events);
        new_events
    }

    fn record(&self, events: &[SchedulerEvent]) {
        if !events.is_empty() {
            self.events.lock().extend(events.iter().cloned());
        }
    }

    /// Run the loop until the shutdown signal flips.
    pub async fn run(
        &self,
        dispatcher: &dyn WorkflowDispatcher,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(triggers = self.triggers.len(), "scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick(dispatcher).await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{default_triggers, WeekdayCalendar};
    use chrono::{TimeZone, Utc};
    use common::VirtualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockDispatcher {
        busy: AtomicBool,
        token_ok: AtomicBool,
        dispatched: Mutex<Vec<(String, String)>>,
        count: AtomicUsize,
    }

    impl MockDispatcher {
        fn new() -> Self {
            Self {
                busy: AtomicBool::new(false),
                token_ok: AtomicBool::new(true),
                dispatched: Mutex::new(Vec::new()),
                count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WorkflowDispatcher for MockDispatcher {
        async fn dispatch(&self, workflow: &str, session_id: &str) -> DispatchResult {
            if self.busy.load(Ordering::SeqCst) {
                return DispatchResult::Overlap;
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            self.dispatched
                .lock()
                .push((workflow.to_string(), session_id.to_string()));
            DispatchResult::Started
        }

        async fn token_valid(&self) -> bool {
            self.token_ok.load(Ordering::SeqCst)
        }
    }

    /// 09:00 IST on Monday 2025-01-06 is 03:30 UTC.
    fn ist_monday_0900() -> Arc<VirtualClock> {
        VirtualClock::starting_at(Utc.with_ymd_and_hms(2025, 1, 6, 3, 30, 0).unwrap())
    }

    fn scheduler(clock: Arc<VirtualClock>) -> Scheduler {
        Scheduler::new(
            clock,
            Arc::new(WeekdayCalendar::new()),
            default_triggers(),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fires_intraday_and_news_at_0900() {
        let clock = ist_monday_0900();
        let scheduler = scheduler(clock);
        let dispatcher = MockDispatcher::new();

        let events = scheduler.tick(&dispatcher).await;

        let dispatched = dispatcher.dispatched.lock();
        assert_eq!(dispatched.len(), 2);
        assert!(dispatched.iter().any(|(w, _)| w == "intraday-analysis"));
        assert!(dispatched.iter().any(|(w, _)| w == "news-digest"));
        assert!(dispatched.iter().all(|(_, s)| s == "2025-01-06"));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_same_minute_does_not_double_fire() {
        let clock = ist_monday_0900();
        let scheduler = scheduler(clock);
        let dispatcher = MockDispatcher::new();

        scheduler.tick(&dispatcher).await;
        scheduler.tick(&dispatcher).await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_weekend_skipped() {
        // Saturday 2025-01-11, 09:00 IST.
        let clock =
            VirtualClock::starting_at(Utc.with_ymd_and_hms(2025, 1, 11, 3, 30, 0).unwrap());
        let scheduler = scheduler(clock);
        let dispatcher = MockDispatcher::new();

        let events = scheduler.tick(&dispatcher).await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 0);
        assert!(matches!(events[0], SchedulerEvent::NonTradingDay { .. }));
    }

    #[tokio::test]
    async fn test_overlap_dropped_with_audit_event() {
        // 10:40 IST monitoring trigger wait, next at 11:00 news+monitor?
        // Use 09:30 and 09:50 monitoring minutes.
        let clock =
            VirtualClock::starting_at(Utc.with_ymd_and_hms(2025, 1, 6, 4, 0, 0).unwrap());
        let scheduler = scheduler(clock.clone());
        let dispatcher = MockDispatcher::new();

        // 09:30 IST: monitoring fires.
        let events = scheduler.tick(&dispatcher).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::Fired { workflow, .. } if workflow == "position-monitoring")));

        // The 09:30 run is still in flight at 09:50: dropped, audited.
        dispatcher.busy.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::minutes(20));
        let events = scheduler.tick(&dispatcher).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::OverlapDropped { workflow, .. } if workflow == "position-monitoring")));
        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_catch_up_after_gap() {
        let clock = ist_monday_0900();
        let scheduler = scheduler(clock.clone());
        let dispatcher = MockDispatcher::new();

        // The process was "down" through 09:00 and 09:15; the first tick
        // happens at 09:22.
        clock.advance(chrono::Duration::minutes(22));
        let events = scheduler.tick(&dispatcher).await;

        // Nothing is due at 09:22 and nothing is replayed.
        assert!(events.is_empty());
        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_gate_blocks_dispatch() {
        let clock = ist_monday_0900();
        let scheduler = scheduler(clock);
        let dispatcher = MockDispatcher::new();
        dispatcher.token_ok.store(false, Ordering::SeqCst);

        let events = scheduler.tick(&dispatcher).await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 0);
        assert!(events
            .iter()
            .all(|e| matches!(e, SchedulerEvent::TokenGateClosed { .. })));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_full_day_cadence() {
        let clock = ist_monday_0900();
        let scheduler = scheduler(clock.clone());
        let dispatcher = MockDispatcher::new();

        // Tick every minute from 09:00 through 16:00 IST.
        for _ in 0..=(7 * 60) {
            scheduler.tick(&dispatcher).await;
            clock.advance(chrono::Duration::minutes(1));
        }

        let dispatched = dispatcher.dispatched.lock();
        let count = |name: &str| dispatched.iter().filter(|(w, _)| w == name).count();
        assert_eq!(count("intraday-analysis"), 1);
        assert_eq!(count("order-execution"), 1);
        // 09:30 through 15:10 every 20 minutes.
        assert_eq!(count("position-monitoring"), 18);
        // 09:00 through 16:00 hourly.
        assert_eq!(count("news-digest"), 8);
        assert_eq!(count("post-trade-analysis"), 1);
    }
}
