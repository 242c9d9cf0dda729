//! Transport channels for delivering assistant responses.
//!
//! Two channel kinds sit behind the [`Transport`] trait:
//!
//! ```text
//! Transport (trait)
//!     │
//!     ├── open_persistent ──> PersistentChannel (WebSocket, server push)
//!     │                         └── inbound ChannelEvents pushed to the supervisor
//!     │
//!     └── open_streaming ───> ByteStream (HTTP POST, chunked body)
//!                               └── scoped to exactly one response
//! ```
//!
//! [`NetworkTransport`] is the production implementation. Tests substitute
//! an in-memory transport.
//!
//! # Generations
//!
//! Every persistent channel is opened with a [`ChannelEvents`] sink tagged
//! with a generation number. When the supervisor replaces a channel, events
//! still in flight from the old one carry a stale generation and are
//! discarded.

pub mod persistent;
pub mod streaming;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

use crate::protocol::ChatRequest;
use crate::session::SessionId;
use crate::supervisor::SupervisorEvent;

pub use persistent::WebSocketChannel;
pub use streaming::StreamingRequestChannel;

/// Body of a one-shot streaming response, read incrementally.
pub type ByteStream = BoxStream<'static, Result<Bytes, ChannelError>>;

/// Errors that can occur during channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Failed to establish the connection.
    ConnectionFailed(String),
    /// Failed to write a message.
    SendFailed(String),
    /// The one-shot request returned a non-success status.
    RequestFailed {
        /// HTTP status code.
        status: u16,
    },
    /// Reading the streaming body failed part way.
    Stream(String),
    /// The channel was closed.
    Closed,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::RequestFailed { status } => write!(f, "Request failed with status {status}"),
            Self::Stream(msg) => write!(f, "Stream error: {msg}"),
            Self::Closed => write!(f, "Channel closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Something the persistent channel observed, reported to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One inbound text frame.
    Message(String),
    /// A transport error. The channel may or may not close afterwards.
    Error(String),
    /// The channel closed. Always the last event of a channel.
    Closed,
}

/// Which channel carries a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRoute {
    /// The long-lived bidirectional channel.
    Persistent,
    /// A one-shot streaming request.
    Streaming,
}

/// Sink through which a persistent channel reports inbound events.
///
/// Cloneable; every clone carries the same generation.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl ChannelEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the channel this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the supervisor has shut down.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        self.tx
            .send(SupervisorEvent::Channel {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// An open, long-lived bidirectional channel.
#[async_trait]
pub trait PersistentChannel: Send {
    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::SendFailed` if the write fails.
    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError>;

    /// Close the channel. Inbound events stop after this returns.
    async fn close(&mut self);
}

/// Factory for both channel kinds.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the persistent channel for a session.
    ///
    /// Inbound frames, errors, and the final closure are reported through
    /// `events` for as long as the channel lives.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ConnectionFailed` if the channel cannot be opened.
    async fn open_persistent(
        &self,
        session_id: &SessionId,
        events: ChannelEvents,
    ) -> Result<Box<dyn PersistentChannel>, ChannelError>;

    /// Issue a one-shot request and return its body as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ConnectionFailed` on network failure and
    /// `ChannelError::RequestFailed` on a non-success status.
    async fn open_streaming(&self, request: &ChatRequest) -> Result<ByteStream, ChannelError>;
}

/// Production transport: WebSocket for the persistent channel, HTTP for the
/// one-shot channel, both against the same server.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    server_url: String,
    streaming: StreamingRequestChannel,
}

impl NetworkTransport {
    /// Create a transport for `server_url` (an `http://` or `https://` base).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let server_url = server_url.trim_end_matches('/').to_string();
        let streaming = StreamingRequestChannel::new(&server_url)?;
        Ok(Self {
            server_url,
            streaming,
        })
    }

    /// Server base URL, without trailing slash.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn open_persistent(
        &self,
        session_id: &SessionId,
        events: ChannelEvents,
    ) -> Result<Box<dyn PersistentChannel>, ChannelError> {
        let url = persistent::endpoint_url(&self.server_url, session_id);
        let channel = WebSocketChannel::open(&url, events).await?;
        Ok(Box::new(channel))
    }

    async fn open_streaming(&self, request: &ChatRequest) -> Result<ByteStream, ChannelError> {
        self.streaming.open(request).await
    }
}
