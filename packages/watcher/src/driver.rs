//! Stream Driver
//!
//! Runs a watcher session: an optional history catch-up followed by live
//! tailing. Each operation goes through filter, authorization, decode and
//! relay; window counters drive the periodic status reports.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::authorization::{AuthorizationSet, Directory};
use crate::clock::Clock;
use crate::config::{DecodePolicy, HistoryRequest, HistoryStart, ResumePolicy, WatcherConfig};
use crate::decoder::{decode, decode_diagnostic, post_bytes};
use crate::error::WatcherError;
use crate::relay::Relay;
use crate::report::{format_delta, format_timestamp, ReportEmitter};
use crate::sink::Sinks;
use crate::source::{Chain, Operation, StreamStart};
use crate::stats::{RunningStats, WindowStats};

/// History ends once an operation is fresher than this
pub const CATCH_UP_LAG_SECS: i64 = 2;

/// Live mode refreshes the authorization set after this much event time
pub const AUTH_REFRESH_HOURS: i64 = 1;

/// Resolved bounds of a history scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub start_block: u64,
    pub start_time: DateTime<Utc>,
    /// Stop once an operation is past this instant
    pub stop_at: Option<DateTime<Utc>>,
    /// Operations of `start_block` already processed before a restart
    pub skip_ops: usize,
}

impl HistoryWindow {
    /// Window starting at a block, without a resume offset
    pub fn new(
        start_block: u64,
        start_time: DateTime<Utc>,
        stop_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            start_block,
            start_time,
            stop_at,
            skip_ops: 0,
        }
    }

    /// Check if an operation with this timestamp and lag ends the catch-up
    pub fn should_stop(&self, post_time: DateTime<Utc>, lag: Duration) -> bool {
        lag < Duration::seconds(CATCH_UP_LAG_SECS)
            || self.stop_at.is_some_and(|stop| post_time > stop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    History(HistoryWindow),
    Live,
}

/// How a scan finished without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// History reached the chain head or its stop time
    CaughtUp { block_num: u64 },
    /// A finite source ran out
    SourceClosed,
}

/// How a session finished without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// History-only run completed
    HistoryOnly,
    /// The live source ended
    SourceClosed,
}

/// Position of the last fully processed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub block_num: u64,
    pub timestamp: DateTime<Utc>,
    /// Operations of `block_num` processed so far, in stream order
    pub ops_in_block: usize,
}

enum Step {
    Continue,
    CaughtUp,
}

struct ScanState {
    mode: ScanMode,
    window: WindowStats,
    live_period_start: DateTime<Utc>,
    allowed: AuthorizationSet,
}

/// The watcher: owns the collaborators and the running statistics
pub struct Watcher {
    config: WatcherConfig,
    chain: Arc<dyn Chain>,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    relay: Relay,
    reporter: ReportEmitter,
    stats: RunningStats,
    checkpoint: Option<Checkpoint>,
    history_stop_at: Option<DateTime<Utc>>,
    /// Configured history has not run to completion yet
    history_pending: bool,
    last_report: Option<String>,
}

impl Watcher {
    pub fn new(
        config: WatcherConfig,
        chain: Arc<dyn Chain>,
        directory: Arc<dyn Directory>,
        clock: Arc<dyn Clock>,
        sinks: Sinks,
    ) -> Self {
        let reporter = ReportEmitter::new(config.output.quiet, config.reports_enabled());
        let relay = Relay::new(config.output, sinks);
        let history_pending = config.history.is_some();
        Self {
            config,
            chain,
            directory,
            clock,
            relay,
            reporter,
            stats: RunningStats::new(),
            checkpoint: None,
            history_stop_at: None,
            history_pending,
            last_report: None,
        }
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint
    }

    /// Most recent status line, if any was written
    pub fn last_report(&self) -> Option<&str> {
        self.last_report.as_deref()
    }

    /// Run one session: history catch-up if due, then live
    ///
    /// # Returns
    /// How the session ended; errors are left to the supervisor
    pub async fn run_session(&mut self) -> Result<SessionEnd, WatcherError> {
        if let Some(window) = self.next_history().await? {
            self.scan(ScanMode::History(window)).await?;
            self.history_pending = false;
        }

        if self.config.history_only {
            info!("history_only is set. exiting");
            return Ok(SessionEnd::HistoryOnly);
        }

        self.scan(ScanMode::Live).await?;
        Ok(SessionEnd::SourceClosed)
    }

    async fn next_history(&mut self) -> Result<Option<HistoryWindow>, WatcherError> {
        if self.config.resume_policy == ResumePolicy::Checkpoint {
            if let Some(cp) = self.checkpoint {
                info!(
                    "Resuming from block_num: {} after {} operations",
                    cp.block_num, cp.ops_in_block
                );
                // A fault inside the configured history keeps its bound
                let stop_at = if self.history_pending {
                    self.history_stop_at
                } else {
                    None
                };
                return Ok(Some(HistoryWindow {
                    start_block: cp.block_num,
                    start_time: cp.timestamp,
                    stop_at,
                    skip_ops: cp.ops_in_block,
                }));
            }
        }

        let rerun =
            self.history_pending && (self.checkpoint.is_none() || self.config.history_only);
        match self.config.history {
            Some(request) if rerun => self.resolve_history(request).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Turn a requested start point into block and time bounds
    pub async fn resolve_history(
        &mut self,
        request: HistoryRequest,
    ) -> Result<HistoryWindow, WatcherError> {
        let (start_block, start_time) = match request.start {
            HistoryStart::Block(block_num) => {
                (block_num, self.chain.block_timestamp(block_num).await?)
            }
            HistoryStart::Since(at) => (self.chain.estimate_block_num(at).await?, at),
        };
        // Past the representable range means unbounded
        let stop_at = request
            .stop_after
            .and_then(|hours| start_time.checked_add_signed(hours));
        self.history_stop_at = stop_at;

        Ok(HistoryWindow::new(start_block, start_time, stop_at))
    }

    /// Scan one mode until it ends
    pub async fn scan(&mut self, mode: ScanMode) -> Result<ScanEnd, WatcherError> {
        let scan_started = self.clock.now();
        let allowed =
            AuthorizationSet::fetch(self.directory.as_ref(), &self.config.master_account).await?;

        let (start, period_start) = match mode {
            ScanMode::History(window) => {
                if self.config.reports_enabled() {
                    info!("Started catching up");
                }
                (StreamStart::Block(window.start_block), window.start_time)
            }
            ScanMode::Live => {
                if self.config.reports_enabled() {
                    let head = self.chain.head_block_num().await?;
                    info!("Watching live from block_num: {}", head);
                }
                (StreamStart::Head, scan_started)
            }
        };
        let (mut skip, resume_block) = match mode {
            ScanMode::History(window) => (window.skip_ops, window.start_block),
            ScanMode::Live => (0, 0),
        };

        let mut source = self.chain.open_stream(start).await?;
        let mut state = ScanState {
            mode,
            window: WindowStats::new(period_start),
            live_period_start: period_start,
            allowed,
        };

        let mut end = ScanEnd::SourceClosed;
        while let Some(op) = source.next_operation().await? {
            if skip > 0 {
                if op.block_num == resume_block {
                    skip -= 1;
                    continue;
                }
                skip = 0;
            }
            if let Step::CaughtUp = self.process(&mut state, &op).await? {
                end = ScanEnd::CaughtUp {
                    block_num: op.block_num,
                };
                break;
            }
        }

        if let (ScanMode::History(_), Some(cp)) = (mode, self.checkpoint) {
            if !self.config.output.urls_only {
                info!(
                    "Finished catching up at block_num: {} in {}",
                    cp.block_num,
                    format_delta(self.clock.now() - scan_started)
                );
            }
        }
        Ok(end)
    }

    async fn process(
        &mut self,
        state: &mut ScanState,
        op: &Operation,
    ) -> Result<Step, WatcherError> {
        let post_time = op.timestamp;
        let now = self.clock.now();
        self.stats.record_first_timestamp(post_time);

        let since_window = post_time - state.window.period_start;
        let lag = now - post_time;
        state.window.posts_seen += 1;

        if let Some(interval) = self.config.report_interval {
            if since_window > interval {
                self.report(&state.window, now, op, lag.max(Duration::seconds(1)));
                state.window.reset(post_time);
            }
        }

        if self.config.filter.is_watched(&op.id) && state.allowed.intersects(&op.required_auths) {
            self.relay_ping(&mut state.window, op).await?;
        }

        if self.config.diagnostic && self.config.filter.is_diagnostic(&op.id) {
            log_diagnostic(op);
        }

        let ops_in_block = match self.checkpoint {
            Some(cp) if cp.block_num == op.block_num => cp.ops_in_block + 1,
            _ => 1,
        };
        self.checkpoint = Some(Checkpoint {
            block_num: op.block_num,
            timestamp: post_time,
            ops_in_block,
        });

        match state.mode {
            ScanMode::History(window) => {
                if window.should_stop(post_time, lag) {
                    if self.config.reports_enabled() && !self.config.output.urls_only {
                        self.report(&state.window, now, op, lag);
                    }
                    if !self.config.output.urls_only {
                        info!("block_num: {}", op.block_num);
                    }
                    return Ok(Step::CaughtUp);
                }
            }
            ScanMode::Live => {
                if post_time - state.live_period_start > Duration::hours(AUTH_REFRESH_HOURS) {
                    state.allowed = AuthorizationSet::fetch(
                        self.directory.as_ref(),
                        &self.config.master_account,
                    )
                    .await?;
                    state.live_period_start = post_time;
                }
            }
        }

        Ok(Step::Continue)
    }

    fn report(
        &mut self,
        window: &WindowStats,
        now: DateTime<Utc>,
        op: &Operation,
        lag: Duration,
    ) {
        let line = self.reporter.emit(
            &self.stats,
            now,
            op.timestamp,
            window.pings,
            window.posts_seen,
            Some(lag),
            Some(op.block_num),
        );
        if line.is_some() {
            self.last_report = line;
        }
    }

    async fn relay_ping(
        &mut self,
        window: &mut WindowStats,
        op: &Operation,
    ) -> Result<(), WatcherError> {
        let ping = match decode(&op.json) {
            Ok(ping) => ping,
            Err(source) => match self.config.decode_policy {
                DecodePolicy::Skip => {
                    warn!("Skipping undecodable ping | {} | {}", op.trx_id, source);
                    return Ok(());
                }
                DecodePolicy::Restart => {
                    return Err(WatcherError::Decode {
                        trx_id: op.trx_id.clone(),
                        source,
                    })
                }
            },
        };

        let count = self.relay.relay(&ping, op).await?;
        window.pings += count;
        self.stats.record(count, post_bytes(&op.json));
        Ok(())
    }
}

fn log_diagnostic(op: &Operation) {
    match decode_diagnostic(&op.json) {
        Ok(diag) => {
            info!(
                "Diagnostic | {} | {} | {} | {}",
                format_timestamp(op.timestamp),
                diag.server_account.as_deref().unwrap_or(""),
                op.trx_id,
                diag.message.as_deref().unwrap_or("")
            );
            if let Ok(pretty) = serde_json::to_string_pretty(&diag.body) {
                info!("{}", pretty);
            }
        }
        Err(e) => warn!("Unreadable diagnostic | {} | {}", op.trx_id, e),
    }
}
