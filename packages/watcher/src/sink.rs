//! Forwarding Sinks
//!
//! Destinations that receive every announced feed URL: a raw TCP socket, a
//! ZeroMQ REQ socket, or a Redis pub/sub channel. Sends are awaited so a
//! failing sink surfaces instead of silently dropping URLs.

use std::net::SocketAddr;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::config::SinkTargets;

/// Default Redis channel for forwarded URLs
pub const DEFAULT_REDIS_CHANNEL: &str = "podping";

/// Errors that can occur while forwarding a URL
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZMQ error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Receives one URL at a time
#[async_trait]
pub trait UrlSink: Send {
    async fn send(&mut self, url: &str) -> Result<(), SinkError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Sink that accepts and discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl UrlSink for NullSink {
    async fn send(&mut self, _url: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Opens a TCP connection per URL, writes it, and closes
#[derive(Debug, Clone)]
pub struct TcpSink {
    addr: SocketAddr,
}

impl TcpSink {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl UrlSink for TcpSink {
    async fn send(&mut self, url: &str) -> Result<(), SinkError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(url.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "socket"
    }
}

/// ZeroMQ REQ socket; every URL waits for the peer's reply
pub struct ZmqSink {
    socket: ReqSocket,
    endpoint: String,
}

impl ZmqSink {
    /// Connect to a `tcp://host:port` endpoint
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, SinkError> {
        let endpoint = endpoint.into();
        let mut socket = ReqSocket::new();
        socket.connect(&endpoint).await?;
        info!("Connected ZMQ sink to {}", endpoint);
        Ok(Self { socket, endpoint })
    }
}

#[async_trait]
impl UrlSink for ZmqSink {
    async fn send(&mut self, url: &str) -> Result<(), SinkError> {
        self.socket.send(ZmqMessage::from(url.to_string())).await?;
        let _ack: ZmqMessage = self.socket.recv().await?;
        debug!("ZMQ ack from {} for {}", self.endpoint, url);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "zmq"
    }
}

/// Publishes URLs on a Redis pub/sub channel
pub struct RedisSink {
    connection: MultiplexedConnection,
    channel: String,
}

impl RedisSink {
    /// Create a sink on an established connection
    pub fn new(connection: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
        }
    }

    /// Open a connection to `redis_url` and publish on `channel`
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self, SinkError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        let sink = Self::new(connection, channel);
        info!("Connected Redis sink, channel {}", sink.channel);
        Ok(sink)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl UrlSink for RedisSink {
    async fn send(&mut self, url: &str) -> Result<(), SinkError> {
        let subscribers: i64 = self.connection.publish(&self.channel, url).await?;
        debug!("Published {} to {} subscriber(s)", url, subscribers);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Fan-out over the configured sinks; empty means forwarding is a no-op
#[derive(Default)]
pub struct Sinks {
    sinks: Vec<Box<dyn UrlSink>>,
}

impl Sinks {
    pub fn new(sinks: Vec<Box<dyn UrlSink>>) -> Self {
        Self { sinks }
    }

    /// Open every configured destination
    ///
    /// # Arguments
    /// * `targets` - Destinations from the command line
    ///
    /// # Returns
    /// The connected sinks, or the first connection failure
    pub async fn from_targets(targets: &SinkTargets) -> Result<Self, SinkError> {
        let mut sinks = Self::default();

        if let Some(addr) = targets.socket {
            info!("Forwarding urls to socket {}", addr);
            sinks.push(Box::new(TcpSink::new(addr)));
        }
        if let Some(endpoint) = &targets.zmq {
            sinks.push(Box::new(ZmqSink::connect(endpoint.clone()).await?));
        }
        if let Some((url, channel)) = &targets.redis {
            sinks.push(Box::new(RedisSink::connect(url, channel.clone()).await?));
        }

        Ok(sinks)
    }

    pub fn push(&mut self, sink: Box<dyn UrlSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Send a URL to every sink in order, stopping at the first failure
    pub async fn forward(&mut self, url: &str) -> Result<(), SinkError> {
        for sink in self.sinks.iter_mut() {
            sink.send(url).await?;
        }
        Ok(())
    }
}
