//! Ping Statistics
//!
//! Running totals for the life of the process and per-window counters that
//! reset on every status report.

use chrono::{DateTime, Utc};

/// Totals since process start; survives mode switches and session restarts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningStats {
    start_time: Option<DateTime<Utc>>,
    total_pings: u64,
    total_bytes: u64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the timestamp of the first processed event; later calls are ignored
    pub fn record_first_timestamp(&mut self, ts: DateTime<Utc>) {
        self.start_time.get_or_insert(ts);
    }

    /// Add an emitted ping count and the payload size to the totals
    pub fn record(&mut self, pings: u64, bytes: u64) {
        self.total_pings += pings;
        self.total_bytes += bytes;
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn total_pings(&self) -> u64 {
        self.total_pings
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Counters for the current report window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStats {
    pub period_start: DateTime<Utc>,
    /// Pings emitted in this window
    pub pings: u64,
    /// Operations seen in this window, watched or not
    pub posts_seen: u64,
}

impl WindowStats {
    pub fn new(period_start: DateTime<Utc>) -> Self {
        Self {
            period_start,
            pings: 0,
            posts_seen: 0,
        }
    }

    /// Start a new window at `ts` with zeroed counters
    pub fn reset(&mut self, ts: DateTime<Utc>) {
        *self = Self::new(ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    // ==================== RunningStats tests ====================

    #[test]
    fn test_running_stats_start_empty() {
        let stats = RunningStats::new();
        assert_eq!(stats.start_time(), None);
        assert_eq!(stats.total_pings(), 0);
        assert_eq!(stats.total_bytes(), 0);
    }

    #[test]
    fn test_first_timestamp_wins() {
        let mut stats = RunningStats::new();
        stats.record_first_timestamp(at(0));
        stats.record_first_timestamp(at(10));
        stats.record_first_timestamp(at(-10));
        assert_eq!(stats.start_time(), Some(at(0)));
    }

    #[test]
    fn test_record_accumulates() {
        let mut stats = RunningStats::new();
        stats.record(1, 120);
        stats.record(3, 200);
        stats.record(0, 0);
        assert_eq!(stats.total_pings(), 4);
        assert_eq!(stats.total_bytes(), 320);
    }

    // ==================== WindowStats tests ====================

    #[test]
    fn test_window_reset_zeroes_counters() {
        let mut window = WindowStats::new(at(0));
        window.pings = 5;
        window.posts_seen = 42;
        window.reset(at(300));
        assert_eq!(window, WindowStats::new(at(300)));
    }
}
