//! Hive JSON-RPC Client
//!
//! Minimal `condenser_api` client over HTTP: head block, block timestamps,
//! `custom_json` operations per block, and follow lists. Implements both the
//! `Chain` and the `Directory` seams of the watcher.

use std::collections::VecDeque;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::authorization::{Directory, DirectoryError};
use crate::error::WatcherError;
use crate::source::{Chain, EventSource, Operation, StreamStart};

/// Hive produces one block every 3 seconds
pub const BLOCK_INTERVAL_SECS: i64 = 3;

/// Operation type the watcher streams
pub const CUSTOM_JSON_OP: &str = "custom_json";

/// Timestamp format used by the node
pub const NODE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Page size for `get_following`
pub const FOLLOWING_PAGE_SIZE: usize = 1000;

/// HTTP request timeout in milliseconds
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Errors that can occur talking to a Hive node
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Subset of `get_dynamic_global_properties`
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalProperties {
    pub head_block_number: u64,
    pub time: String,
}

#[derive(Debug, Deserialize)]
struct AppliedOperation {
    trx_id: String,
    block: u64,
    timestamp: String,
    op: (String, Value),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CustomJson {
    required_posting_auths: Vec<String>,
    id: String,
    json: String,
}

#[derive(Debug, Deserialize)]
struct FollowEntry {
    following: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

/// Parse a node timestamp (always UTC, no offset)
pub fn parse_node_time(value: &str) -> Result<DateTime<Utc>, RpcError> {
    NaiveDateTime::parse_from_str(value, NODE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| RpcError::Malformed(format!("bad timestamp '{}': {}", value, e)))
}

/// Estimate the block produced at `at` from the head block and its time
pub fn estimate_block(head_block: u64, head_time: DateTime<Utc>, at: DateTime<Utc>) -> u64 {
    let behind = (head_time - at).num_seconds().max(0) / BLOCK_INTERVAL_SECS;
    head_block.saturating_sub(behind as u64)
}

fn to_operation(applied: AppliedOperation) -> Result<Option<Operation>, RpcError> {
    let (op_type, body) = applied.op;
    if op_type != CUSTOM_JSON_OP {
        return Ok(None);
    }
    // Trx ids are hex encoded hashes
    hex::decode(&applied.trx_id)
        .map_err(|e| RpcError::Malformed(format!("bad trx_id '{}': {}", applied.trx_id, e)))?;

    let custom: CustomJson =
        serde_json::from_value(body).map_err(|e| RpcError::Malformed(e.to_string()))?;

    Ok(Some(Operation {
        id: custom.id,
        required_auths: custom.required_posting_auths,
        json: custom.json,
        timestamp: parse_node_time(&applied.timestamp)?,
        trx_id: applied.trx_id,
        block_num: applied.block,
    }))
}

/// Hive API client
#[derive(Debug, Clone)]
pub struct HiveClient {
    http: reqwest::Client,
    node: String,
}

impl HiveClient {
    pub fn new(node: impl Into<String>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_millis(REQUEST_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            http,
            node: node.into(),
        })
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };
        let response: RpcResponse<T> = self
            .http
            .post(&self.node)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| RpcError::Malformed(format!("{} returned no result", method)))
    }

    pub async fn global_properties(&self) -> Result<GlobalProperties, RpcError> {
        self.call("condenser_api.get_dynamic_global_properties", json!([])).await
    }

    /// `custom_json` operations of one block, in chain order
    pub async fn custom_json_ops(&self, block_num: u64) -> Result<Vec<Operation>, RpcError> {
        let applied: Vec<AppliedOperation> = self
            .call("condenser_api.get_ops_in_block", json!([block_num, false]))
            .await?;

        let mut ops = Vec::new();
        for entry in applied {
            if let Some(op) = to_operation(entry)? {
                ops.push(op);
            }
        }
        Ok(ops)
    }

    pub async fn block_time(&self, block_num: u64) -> Result<DateTime<Utc>, RpcError> {
        let header: Option<BlockHeader> =
            self.call("condenser_api.get_block", json!([block_num])).await?;
        let header = header
            .ok_or_else(|| RpcError::Malformed(format!("block {} not found", block_num)))?;
        parse_node_time(&header.timestamp)
    }

    /// Every account `account` follows, across pages
    pub async fn following_all(&self, account: &str) -> Result<Vec<String>, RpcError> {
        let mut accounts: Vec<String> = Vec::new();
        let mut start = String::new();
        loop {
            let page: Vec<FollowEntry> = self
                .call(
                    "condenser_api.get_following",
                    json!([account, start, "blog", FOLLOWING_PAGE_SIZE]),
                )
                .await?;
            let full_page = page.len() >= FOLLOWING_PAGE_SIZE;

            // Later pages repeat their start account first
            for entry in page {
                if accounts.last() != Some(&entry.following) {
                    accounts.push(entry.following);
                }
            }

            match accounts.last() {
                Some(last) if full_page && *last != start => start = last.clone(),
                _ => break,
            }
        }
        debug!("{} follows {} accounts", account, accounts.len());
        Ok(accounts)
    }
}

#[async_trait]
impl Chain for HiveClient {
    async fn open_stream(&self, start: StreamStart) -> Result<Box<dyn EventSource>, WatcherError> {
        let head = self.global_properties().await.map_err(WatcherError::stream)?.head_block_number;
        let next_block = match start {
            StreamStart::Block(block_num) => block_num,
            StreamStart::Head => head,
        };
        info!("Opening custom_json stream at block {} (head {})", next_block, head);
        Ok(Box::new(HiveStream::new(self.clone(), next_block, head)))
    }

    async fn head_block_num(&self) -> Result<u64, WatcherError> {
        Ok(self.global_properties().await.map_err(WatcherError::stream)?.head_block_number)
    }

    async fn block_timestamp(&self, block_num: u64) -> Result<DateTime<Utc>, WatcherError> {
        self.block_time(block_num).await.map_err(WatcherError::stream)
    }

    async fn estimate_block_num(&self, at: DateTime<Utc>) -> Result<u64, WatcherError> {
        let props = self.global_properties().await.map_err(WatcherError::stream)?;
        let head_time = parse_node_time(&props.time).map_err(WatcherError::stream)?;
        Ok(estimate_block(props.head_block_number, head_time, at))
    }
}

#[async_trait]
impl Directory for HiveClient {
    async fn following(&self, account: &str) -> Result<Vec<String>, DirectoryError> {
        self.following_all(account)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}

/// Block-by-block `custom_json` stream that waits at the head for new blocks
pub struct HiveStream {
    client: HiveClient,
    next_block: u64,
    head: u64,
    pending: VecDeque<Operation>,
    poll_interval: StdDuration,
}

impl HiveStream {
    pub fn new(client: HiveClient, next_block: u64, head: u64) -> Self {
        Self {
            client,
            next_block,
            head,
            pending: VecDeque::new(),
            poll_interval: StdDuration::from_secs(BLOCK_INTERVAL_SECS as u64),
        }
    }

    pub fn next_block(&self) -> u64 {
        self.next_block
    }
}

#[async_trait]
impl EventSource for HiveStream {
    async fn next_operation(&mut self) -> Result<Option<Operation>, WatcherError> {
        loop {
            if let Some(op) = self.pending.pop_front() {
                return Ok(Some(op));
            }

            if self.next_block > self.head {
                self.head = self
                    .client
                    .global_properties()
                    .await
                    .map_err(WatcherError::stream)?
                    .head_block_number;
                if self.next_block > self.head {
                    sleep(self.poll_interval).await;
                    continue;
                }
            }

            let ops = self
                .client
                .custom_json_ops(self.next_block)
                .await
                .map_err(WatcherError::stream)?;
            self.pending.extend(ops);
            self.next_block += 1;
        }
    }
}
