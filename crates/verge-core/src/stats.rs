use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a finished task or cycle is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    OnTime,
    /// Finished late, deleted, or expired unactioned.
    Missed,
}

/// Long-run completion counters. `total_finished` always equals the sum of
/// the other two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub completed_on_time: u64,
    #[serde(default)]
    pub deleted_or_expired: u64,
    #[serde(default)]
    pub total_finished: u64,
}

impl Stats {
    pub fn record(&mut self, outcome: Outcome) {
        self.record_many(outcome, 1);
    }

    pub fn record_many(&mut self, outcome: Outcome, count: u64) {
        if count == 0 {
            return;
        }
        match outcome {
            Outcome::OnTime => self.completed_on_time += count,
            Outcome::Missed => self.deleted_or_expired += count,
        }
        self.total_finished += count;
        debug!(?outcome, count, total = self.total_finished, "recorded outcome");
    }

    /// Percentage of finished items completed on time, rounded; 0 when
    /// nothing has finished yet.
    pub fn completion_score(&self) -> u8 {
        if self.total_finished == 0 {
            return 0;
        }
        let ratio = self.completed_on_time as f64 / self.total_finished as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_zero_without_history() {
        assert_eq!(Stats::default().completion_score(), 0);
    }

    #[test]
    fn score_rounds_percentage() {
        let mut stats = Stats::default();
        stats.record_many(Outcome::OnTime, 3);
        stats.record(Outcome::Missed);
        assert_eq!(stats.total_finished, 4);
        assert_eq!(stats.completion_score(), 75);

        let mut thirds = Stats::default();
        thirds.record_many(Outcome::OnTime, 2);
        thirds.record(Outcome::Missed);
        assert_eq!(thirds.completion_score(), 67);
    }

    #[test]
    fn reset_zeroes_counters() {
        let mut stats = Stats::default();
        stats.record(Outcome::OnTime);
        stats.reset();
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn missing_counters_default_to_zero() {
        let stats: Stats = serde_json::from_str(r#"{"completedOnTime":2}"#).expect("parse");
        assert_eq!(stats.completed_on_time, 2);
        assert_eq!(stats.total_finished, 0);
    }
}
