//! Application-wide constants for assistant-stream.
//!
//! This module centralizes timing values, endpoint paths, and user-facing
//! messages so the supervisor, channels, and configuration defaults agree.
//!
//! # Categories
//!
//! - **Timing**: Reconnect and notification intervals
//! - **Endpoints**: Server paths for both transport channels
//! - **Protocol**: Framing markers for the streaming body
//! - **Messages**: Text shown to the user on failure paths

use std::time::Duration;

// ============================================================================
// Timing
// ============================================================================

/// Delay before a reconnect attempt after the persistent channel closes.
///
/// Under the fixed policy this is used for every attempt, with no limit.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Upper bound for the exponential reconnect policy.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// How long an informational notification stays visible.
pub const INFO_NOTIFICATION_TTL: Duration = Duration::from_secs(3);

/// How long an error notification stays visible.
pub const ERROR_NOTIFICATION_TTL: Duration = Duration::from_secs(5);

/// HTTP timeout for establishing the one-shot request.
///
/// Applies to the connect phase only; the streaming body may take as long as
/// the assistant needs to answer.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a persistent channel may take to open before the attempt counts
/// as failed and a reconnect is scheduled.
pub const PERSISTENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single write to the persistent channel.
///
/// A write still pending after this is treated as a failed write and the
/// message goes out as a one-shot request instead.
pub const PERSISTENT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Endpoints
// ============================================================================

/// Path prefix of the persistent channel. The session id is appended.
pub const PERSISTENT_PATH: &str = "/ws";

/// Path of the one-shot streaming request endpoint.
pub const CHAT_PATH: &str = "/api/chat";

/// Default server when neither config nor environment provide one.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

// ============================================================================
// Protocol
// ============================================================================

/// Marker that starts every protocol-bearing line of a streaming body.
pub const EVENT_PREFIX: &str = "data:";

/// Longest partial line the streaming decoder buffers before discarding it.
pub const MAX_PENDING_LINE: usize = 1024 * 1024;

// ============================================================================
// Messages
// ============================================================================

/// Shown when the one-shot request fails outright.
pub const SEND_FAILED_MESSAGE: &str = "Failed to send message, please try again";

/// Shown when the persistent channel reports a transport error.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error, retrying shortly";

/// Shown after the persistent channel comes back following a drop.
pub const CONNECTION_RESTORED_MESSAGE: &str = "Connection restored";
