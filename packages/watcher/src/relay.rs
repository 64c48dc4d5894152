//! Ping Relay
//!
//! Applies the output mode to a decoded ping: logs it, prints bare URLs in
//! urls-only mode, forwards URLs to the sinks, and reports how many pings the
//! operation counts for.

use tracing::info;

use crate::decoder::{post_bytes, PingRecord};
use crate::report::with_thousands;
use crate::sink::{SinkError, Sinks};
use crate::source::Operation;

/// Longest URL prefix shown in a "Feed Updated" line
const LOGGED_URL_CHARS: usize = 59;

/// Output switches from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputMode {
    /// Count pings without logging or forwarding them
    pub quiet: bool,
    /// Print only URLs to stdout
    pub urls_only: bool,
}

/// Emits decoded pings to the log, stdout and the forwarding sinks
pub struct Relay {
    mode: OutputMode,
    sinks: Sinks,
}

impl Relay {
    pub fn new(mode: OutputMode, sinks: Sinks) -> Self {
        Self { mode, sinks }
    }

    /// Relay one authorized ping
    ///
    /// # Arguments
    /// * `ping` - The decoded payload
    /// * `op` - The operation it came from
    ///
    /// # Returns
    /// Number of pings this operation counts for
    pub async fn relay(&mut self, ping: &PingRecord, op: &Operation) -> Result<u64, SinkError> {
        if self.mode.quiet {
            return Ok(if ping.num_urls > 0 { ping.num_urls as u64 } else { 1 });
        }

        let urls = ping.feed_urls();

        if self.mode.urls_only && !urls.is_empty() {
            for url in &urls {
                println!("{}", url);
                self.sinks.forward(url).await?;
            }
            return Ok(urls.len() as u64);
        }

        for url in &urls {
            self.sinks.forward(url).await?;
        }

        info!(
            "Trx details | {} | {:>10} | {:?}",
            op.trx_id,
            with_thousands(post_bytes(&op.json)),
            op.required_auths
        );
        for url in &urls {
            info!(
                "Feed Updated | {} | {:<60} | {:?} | {}",
                op.timestamp,
                truncate(url, LOGGED_URL_CHARS),
                op.required_auths,
                ping.medium_reason
            );
        }
        Ok(urls.len() as u64)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
