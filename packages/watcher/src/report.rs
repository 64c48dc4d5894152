//! Status Reports
//!
//! Formats the periodic status line from the window counters and the running
//! totals, including the KB/hr throughput since the first processed event.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::stats::RunningStats;

/// Throughput in KB per hour, rounded to the nearest integer
///
/// # Arguments
/// * `total_bytes` - Bytes of matched payloads since start
/// * `elapsed` - Wall-clock time since the first processed event
///
/// # Returns
/// KB/hr; elapsed time below one second counts as one second
pub fn kb_per_hour(total_bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.num_seconds().max(1) as f64;
    let kb = total_bytes as f64 / 1024.0;
    (kb / (secs / 3600.0)).round() as u64
}

/// Render an integer with `,` thousands separators
pub fn with_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render a duration as `H:MM:SS`
pub fn format_delta(delta: Duration) -> String {
    let secs = delta.num_seconds();
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.abs();
    format!("{}{}:{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Render a chain timestamp the way status lines show it
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

/// Writes status lines to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEmitter {
    quiet: bool,
    reports_enabled: bool,
}

impl ReportEmitter {
    pub fn new(quiet: bool, reports_enabled: bool) -> Self {
        Self {
            quiet,
            reports_enabled,
        }
    }

    /// Emit one status line
    ///
    /// # Arguments
    /// * `stats` - Running totals
    /// * `now` - Current wall-clock time
    /// * `timestamp` - Timestamp of the event that triggered the report
    /// * `pings` / `posts` - Window counters
    /// * `time_to_now` - Lag of the triggering event; enables the long format
    /// * `block_num` - Block of the triggering event
    ///
    /// # Returns
    /// The line written, or `None` when reporting is suppressed
    #[allow(clippy::too_many_arguments)]
    pub fn emit(
        &self,
        stats: &RunningStats,
        now: DateTime<Utc>,
        timestamp: DateTime<Utc>,
        pings: u64,
        posts: u64,
        time_to_now: Option<Duration>,
        block_num: Option<u64>,
    ) -> Option<String> {
        if self.quiet && !self.reports_enabled {
            return None;
        }

        let block = block_num.map(|b| b.to_string()).unwrap_or_default();
        let line = match time_to_now {
            Some(delta) => {
                let run_time = stats
                    .start_time()
                    .map(|start| now - start)
                    .unwrap_or_else(Duration::zero);
                format!(
                    "{} | Podpings: {:7} / {:10} | Count: {:12} | Bytes: {:>10} | KB/hr: {:>5} \
                     | BlockNum: {} | Time Delta: {}",
                    format_timestamp(timestamp),
                    pings,
                    stats.total_pings(),
                    posts,
                    with_thousands(stats.total_bytes()),
                    with_thousands(kb_per_hour(stats.total_bytes(), run_time)),
                    block,
                    format_delta(delta),
                )
            }
            None => format!(
                "{} | Podpings: {:7} / {:10} | Count: {:12} | BlockNum: {}",
                format_timestamp(timestamp),
                pings,
                stats.total_pings(),
                posts,
                block,
            ),
        };

        info!("{}", line);
        Some(line)
    }
}
