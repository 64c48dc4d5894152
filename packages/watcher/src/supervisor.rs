//! Session Supervisor
//!
//! Keeps the watcher running: every failed or ended session is logged and
//! restarted after an exponential backoff, until shutdown is requested or a
//! history-only run completes.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::driver::{SessionEnd, Watcher};

/// Initial delay before restarting a session
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum delay between restarts
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Restart timing
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
    /// Consecutive unproductive restarts before giving up; `None` never gives up
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            max_restarts: None,
        }
    }
}

impl RestartPolicy {
    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms * 2u64.pow(attempt.min(10));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Why the supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Shutdown signal received
    Interrupted,
    /// History-only run finished
    HistoryComplete,
    /// `max_restarts` consecutive sessions failed without progress
    RestartsExhausted,
}

impl Exit {
    /// Process exit status for this outcome
    pub fn code(&self) -> u8 {
        match self {
            Exit::Interrupted | Exit::HistoryComplete => 0,
            Exit::RestartsExhausted => 1,
        }
    }
}

/// Restart loop around a `Watcher`
pub struct Supervisor {
    watcher: Watcher,
    policy: RestartPolicy,
    restart_attempts: u32,
}

impl Supervisor {
    pub fn new(watcher: Watcher, policy: RestartPolicy) -> Self {
        Self {
            watcher,
            policy,
            restart_attempts: 0,
        }
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Get current restart attempt count
    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }

    /// Run sessions until `shutdown` resolves or the watcher is done
    ///
    /// # Arguments
    /// * `shutdown` - Resolves when the process should stop (e.g. Ctrl-C)
    pub async fn run<F>(&mut self, shutdown: F) -> Exit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let before = self.watcher.checkpoint();

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Terminated with Ctrl-C");
                    return Exit::Interrupted;
                }
                outcome = self.watcher.run_session() => outcome,
            };

            match outcome {
                Ok(SessionEnd::HistoryOnly) => return Exit::HistoryComplete,
                Ok(SessionEnd::SourceClosed) => warn!("Event source closed, restarting"),
                Err(e) => error!("Session failed: {}", e),
            }

            // A session that got anywhere starts the backoff over
            if self.watcher.checkpoint() != before {
                self.restart_attempts = 0;
            }

            if let Some(max) = self.policy.max_restarts {
                if self.restart_attempts >= max {
                    error!("Giving up after {} restarts without progress", max);
                    return Exit::RestartsExhausted;
                }
            }

            let delay = self.policy.backoff_delay(self.restart_attempts);
            self.restart_attempts += 1;
            warn!("Restarting watcher (attempt {}), waiting {:?}", self.restart_attempts, delay);

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Terminated with Ctrl-C");
                    return Exit::Interrupted;
                }
                _ = sleep(delay) => {}
            }
        }
    }
}
