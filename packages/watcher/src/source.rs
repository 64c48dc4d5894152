//! Event Source
//!
//! The chain-facing seam of the watcher: `Chain` opens ordered streams of
//! `custom_json` operations, either from a historical block or from the head.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::WatcherError;

/// One `custom_json` operation from the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Namespaced operation id, e.g. `pp_podcast_update`
    pub id: String,
    /// Accounts whose posting authority signed the operation
    pub required_auths: Vec<String>,
    /// Opaque payload
    pub json: String,
    pub timestamp: DateTime<Utc>,
    pub trx_id: String,
    pub block_num: u64,
}

/// Where a stream starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStart {
    /// Replay from this block number
    Block(u64),
    /// Follow the chain from the current head
    Head,
}

/// Ordered, possibly endless sequence of operations
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next operation
    ///
    /// # Returns
    /// `Ok(None)` once a finite source is exhausted; endless sources never return it
    async fn next_operation(&mut self) -> Result<Option<Operation>, WatcherError>;
}

/// Blockchain client as seen by the driver
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Chain: Send + Sync {
    /// Open a stream of `custom_json` operations
    async fn open_stream(&self, start: StreamStart) -> Result<Box<dyn EventSource>, WatcherError>;

    /// Current head block number
    async fn head_block_num(&self) -> Result<u64, WatcherError>;

    /// Timestamp of a given block
    async fn block_timestamp(&self, block_num: u64) -> Result<DateTime<Utc>, WatcherError>;

    /// Best guess of the block produced at `at`
    async fn estimate_block_num(&self, at: DateTime<Utc>) -> Result<u64, WatcherError>;
}

/// In-memory source replaying a fixed list of operations, then ending
#[derive(Debug, Default)]
pub struct VecSource {
    operations: VecDeque<Result<Operation, String>>,
}

impl VecSource {
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().map(Ok).collect(),
        }
    }

    /// Queue a fault; it is raised when reached, as a node drop would be
    pub fn push_fault(&mut self, reason: impl Into<String>) {
        self.operations.push_back(Err(reason.into()));
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push_back(Ok(operation));
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[async_trait]
impl EventSource for VecSource {
    async fn next_operation(&mut self) -> Result<Option<Operation>, WatcherError> {
        match self.operations.pop_front() {
            Some(Ok(op)) => Ok(Some(op)),
            Some(Err(reason)) => Err(WatcherError::StreamFault(reason)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn op(block_num: u64) -> Operation {
        Operation {
            id: "pp_podcast_update".to_string(),
            required_auths: vec!["podping.aaa".to_string()],
            json: "{}".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + block_num as i64 * 3, 0).unwrap(),
            trx_id: format!("{:040x}", block_num),
            block_num,
        }
    }

    #[tokio::test]
    async fn test_vec_source_preserves_order() {
        let mut source = VecSource::new((1..=5).map(op));
        assert_eq!(source.len(), 5);
        for expected in 1..=5 {
            let next = source.next_operation().await.unwrap().unwrap();
            assert_eq!(next.block_num, expected);
        }
        assert!(source.is_empty());
        assert!(source.next_operation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vec_source_raises_queued_fault() {
        let mut source = VecSource::new([op(1)]);
        source.push_fault("node dropped");
        source.push(op(2));

        assert!(source.next_operation().await.unwrap().is_some());
        let err = source.next_operation().await.unwrap_err();
        assert!(matches!(err, WatcherError::StreamFault(ref m) if m == "node dropped"));
        assert_eq!(source.next_operation().await.unwrap().unwrap().block_num, 2);
    }
}
