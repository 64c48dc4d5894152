//! Watcher Errors
//!
//! Session-level error taxonomy. Every variant aborts the current scan session
//! and is handed to the supervisor, which logs it and restarts.

use thiserror::Error;

use crate::decoder::DecodeError;
use crate::sink::SinkError;

/// Errors that end a scan session
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Directory unavailable while resolving followers of {account}: {reason}")]
    DirectoryUnavailable { account: String, reason: String },

    #[error("Failed to decode payload of trx {trx_id}: {source}")]
    Decode {
        trx_id: String,
        #[source]
        source: DecodeError,
    },

    #[error("Stream fault: {0}")]
    StreamFault(String),

    #[error("Forwarding failed: {0}")]
    Forward(#[from] SinkError),
}

impl WatcherError {
    /// Wrap any displayable failure of the event source or chain client
    pub fn stream(err: impl std::fmt::Display) -> Self {
        WatcherError::StreamFault(err.to_string())
    }
}
