//! Daily rollover: expiring fixed tasks, revealing completed recurring
//! tasks, and advancing stale recurring deadlines.
//!
//! A pass is a pure function of the task list, the stats and `today`; running
//! it again with the same `today` changes nothing. The [`DayWatcher`] and
//! [`Ticker`] decide *when* a pass runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, instrument, trace};

use crate::stats::{Outcome, Stats};
use crate::store::TaskStore;
use crate::task::TaskKind;

/// Counts of what one pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverReport {
    pub revealed: usize,
    pub advanced: usize,
    pub expired: usize,
}

impl RolloverReport {
    pub fn changed(&self) -> bool {
        self.revealed + self.advanced + self.expired > 0
    }
}

#[instrument(skip(store, stats))]
pub fn rollover(store: &mut TaskStore, stats: &mut Stats, today: NaiveDate) -> RolloverReport {
    let mut report = RolloverReport::default();
    let tasks = store.tasks_mut();

    for task in tasks.iter_mut() {
        let TaskKind::Recurring {
            interval,
            completed_today,
        } = &mut task.kind
        else {
            continue;
        };

        if completed_today.is_some() && today >= task.deadline {
            trace!(id = task.id, "recurring task due again");
            *completed_today = None;
            report.revealed += 1;
        }

        // Missed cycles are not counted; the next deadline is taken from
        // today, not from the stale one.
        if task.deadline < today && completed_today.is_none() {
            let next = interval.next_date(today);
            debug!(id = task.id, from = %task.deadline, to = %next, "advancing stale deadline");
            task.deadline = next;
            report.advanced += 1;
        }
    }

    let before = tasks.len();
    tasks.retain(|task| !(task.is_fixed() && task.deadline < today));
    report.expired = before - tasks.len();
    stats.record_many(Outcome::Missed, report.expired as u64);

    if report.changed() {
        info!(
            revealed = report.revealed,
            advanced = report.advanced,
            expired = report.expired,
            "rollover applied"
        );
    }
    report
}

/// Coalesces polls into one signal per calendar day.
#[derive(Debug, Clone, Default)]
pub struct DayWatcher {
    last_seen: Option<NaiveDate>,
}

impl DayWatcher {
    pub fn new(last_seen: Option<NaiveDate>) -> Self {
        Self { last_seen }
    }

    pub fn last_seen(&self) -> Option<NaiveDate> {
        self.last_seen
    }

    /// True when `today` differs from the date seen on the previous poll.
    pub fn poll(&mut self, today: NaiveDate) -> bool {
        if self.last_seen == Some(today) {
            return false;
        }
        debug!(previous = ?self.last_seen, %today, "calendar day changed");
        self.last_seen = Some(today);
        true
    }
}

/// Paces the watch loop. Returns `false` once the loop should stop.
pub trait Ticker {
    fn tick(&mut self) -> bool;
}

/// Sleeps for a fixed interval between ticks. Stops when an attached flag is
/// raised or after an optional number of ticks.
#[derive(Debug, Clone)]
pub struct IntervalTicker {
    interval: Duration,
    stop: Option<Arc<AtomicBool>>,
    limit: Option<u64>,
    ticks: u64,
}

const STOP_CHECK_SLICE: Duration = Duration::from_millis(250);

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: None,
            limit: None,
            ticks: 0,
        }
    }

    /// Ends the loop once `stop` is raised, checked every 250 ms while
    /// sleeping.
    pub fn stop_on(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Ends the loop after `ticks` ticks.
    pub fn limit(mut self, ticks: u64) -> Self {
        self.limit = Some(ticks);
        self
    }

    fn stopped(&self) -> bool {
        self.stop.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

impl Ticker for IntervalTicker {
    fn tick(&mut self) -> bool {
        if self.stopped() || self.limit.is_some_and(|limit| self.ticks >= limit) {
            return false;
        }

        if self.ticks > 0 {
            let deadline = Instant::now() + self.interval;
            loop {
                if self.stopped() {
                    return false;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep(STOP_CHECK_SLICE.min(deadline - now));
            }
        }

        self.ticks += 1;
        trace!(tick = self.ticks, "watch tick");
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::task::{Interval, Task};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single().expect("valid now")
    }

    #[test]
    fn expires_fixed_tasks_before_today() {
        let today = date(2024, 1, 10);
        let mut store = TaskStore::new(vec![
            Task::new_fixed(1, "late".into(), date(2024, 1, 9), created()),
            Task::new_fixed(2, "due".into(), today, created()),
        ]);
        let mut stats = Stats::default();

        let report = rollover(&mut store, &mut stats, today);

        assert_eq!(report.expired, 1);
        assert!(store.find(1).is_none());
        assert!(store.find(2).is_some());
        assert_eq!(stats.deleted_or_expired, 1);
        assert_eq!(stats.total_finished, 1);
    }

    #[test]
    fn stale_recurring_deadline_moves_past_today() {
        let today = date(2024, 1, 10);
        let mut task = Task::new_recurring(1, "Stretch".into(), Interval::Daily, date(2024, 1, 1), created());
        task.deadline = date(2024, 1, 9);
        let mut store = TaskStore::new(vec![task]);
        let mut stats = Stats::default();

        let report = rollover(&mut store, &mut stats, today);

        assert_eq!(report.advanced, 1);
        assert_eq!(store.find(1).expect("kept").deadline, date(2024, 1, 11));
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn stamped_task_with_stale_deadline_is_revealed_and_advanced() {
        let today = date(2024, 1, 20);
        let mut task = Task::new_recurring(1, "Report".into(), Interval::Weekly, date(2024, 1, 1), created());
        task.kind = TaskKind::Recurring {
            interval: Interval::Weekly,
            completed_today: Some(date(2024, 1, 8)),
        };
        task.deadline = date(2024, 1, 15);
        let mut store = TaskStore::new(vec![task]);
        let mut stats = Stats::default();

        let report = rollover(&mut store, &mut stats, today);

        let task = store.find(1).expect("kept");
        assert_eq!(report.revealed, 1);
        assert_eq!(report.advanced, 1);
        assert_eq!(task.completed_today(), None);
        assert_eq!(task.deadline, date(2024, 1, 27));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let today = date(2024, 1, 10);
        let mut stale = Task::new_recurring(2, "Stretch".into(), Interval::Daily, date(2024, 1, 1), created());
        stale.deadline = date(2024, 1, 3);
        let mut store = TaskStore::new(vec![
            Task::new_fixed(1, "late".into(), date(2024, 1, 2), created()),
            stale,
        ]);
        let mut stats = Stats::default();

        assert!(rollover(&mut store, &mut stats, today).changed());
        let (store_after, stats_after) = (store.clone(), stats);

        assert_eq!(rollover(&mut store, &mut stats, today), RolloverReport::default());
        assert_eq!(store, store_after);
        assert_eq!(stats, stats_after);
    }

    #[test]
    fn watcher_fires_once_per_day() {
        let mut watcher = DayWatcher::new(Some(date(2024, 1, 9)));
        assert!(!watcher.poll(date(2024, 1, 9)));
        assert!(watcher.poll(date(2024, 1, 10)));
        assert!(!watcher.poll(date(2024, 1, 10)));
        assert_eq!(watcher.last_seen(), Some(date(2024, 1, 10)));
    }

    #[test]
    fn raised_stop_flag_ends_ticker() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut ticker = IntervalTicker::new(Duration::from_secs(3600)).stop_on(Arc::clone(&stop));
        assert!(ticker.tick());
        stop.store(true, Ordering::Relaxed);
        assert!(!ticker.tick());
    }

    #[test]
    fn tick_limit_ends_ticker() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(1)).limit(2);
        assert!(ticker.tick());
        assert!(ticker.tick());
        assert!(!ticker.tick());
        assert!(!ticker.tick());
    }
}
