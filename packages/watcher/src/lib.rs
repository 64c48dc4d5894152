//! Podping Watcher Library
//!
//! This crate provides components for watching the Hive blockchain for podping
//! notifications: filtering `custom_json` operations, checking publishers against
//! the authorized account set, decoding payloads, and forwarding feed URLs.

pub mod authorization;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod filter;
pub mod hive;
pub mod relay;
pub mod report;
pub mod sink;
pub mod source;
pub mod stats;
pub mod supervisor;

// Re-export commonly used types
pub use authorization::{AuthorizationSet, Directory, DirectoryError};
pub use config::{Args, WatcherConfig};
pub use decoder::{decode, PingRecord};
pub use driver::{SessionEnd, Watcher};
pub use error::WatcherError;
pub use filter::OperationFilter;
pub use hive::HiveClient;
pub use sink::{Sinks, UrlSink};
pub use source::{Chain, EventSource, Operation, StreamStart, VecSource};
pub use supervisor::{Exit, RestartPolicy, Supervisor};
