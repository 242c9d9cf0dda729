//! Assistant Stream - streaming chat client core.
//!
//! This crate keeps one conversation with an assistant server alive over a
//! persistent WebSocket channel, falls back to one-shot streaming HTTP
//! requests when that channel is down, and assembles incremental response
//! chunks into formatted messages.
//!
//! # Architecture
//!
//! The crate follows a single-owner event loop:
//!
//! - **Supervisor** - Owns connectivity, routing, and the response in flight
//! - **Channels** - Persistent (WebSocket) and one-shot (HTTP) transports
//! - **Assembler** - Accumulates chunks and freezes the final message
//! - **Renderer** - Presentation surface (terminal in the binary)
//!
//! # Modules
//!
//! - [`supervisor`] - Connection supervisor and its handle
//! - [`channel`] - Transport trait and the network implementation
//! - [`decoder`] - Frame and event-line decoding
//! - [`assembler`] - Response accumulation
//! - [`format`] - Escaping and inline formatting
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod assembler;
pub mod channel;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod format;
pub mod protocol;
pub mod render;
pub mod session;
pub mod source;
pub mod supervisor;
pub mod ws;

// Re-export commonly used types
pub use assembler::{AccumulatedMessage, Applied, FinishedMessage, StreamAssembler};
pub use channel::{
    ByteStream, ChannelError, ChannelEvent, ChannelEvents, ChannelRoute, NetworkTransport,
    PersistentChannel, Transport,
};
pub use config::{Config, ReconnectPolicy};
pub use protocol::{ChatRequest, ProtocolEvent};
pub use render::{Notification, NotificationId, NotificationLevel, Renderer, TerminalRenderer};
pub use session::{Session, SessionId, SessionState, SessionStatus};
pub use source::{pump, OutgoingMessageSource, ScriptedSource, StdinSource};
pub use supervisor::{ConnectionSupervisor, SupervisorHandle};
