//! Persistent channel over WebSocket.
//!
//! The writer half stays with [`WebSocketChannel`]; the reader half runs in a
//! spawned task that forwards every inbound frame to the supervisor as a
//! [`ChannelEvent`]. The reader always finishes with exactly one
//! `ChannelEvent::Closed`, whether the peer closed cleanly, the stream ended,
//! or a read failed.

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::constants::PERSISTENT_PATH;
use crate::session::SessionId;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

use super::{ChannelError, ChannelEvent, ChannelEvents, PersistentChannel};

/// Build the session-scoped endpoint: `<ws-base>/ws/<session_id>`.
pub fn endpoint_url(server_url: &str, session_id: &SessionId) -> String {
    format!(
        "{}{}/{}",
        ws::http_to_ws_scheme(server_url.trim_end_matches('/')),
        PERSISTENT_PATH,
        session_id
    )
}

/// Open WebSocket channel owned by the supervisor.
#[derive(Debug)]
pub struct WebSocketChannel {
    writer: WsWriter,
    /// Forwards inbound frames. Aborted on drop.
    reader_task: JoinHandle<()>,
    generation: u64,
}

impl WebSocketChannel {
    /// Connect to `url` and start forwarding inbound frames to `events`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ConnectionFailed` if the handshake fails.
    pub async fn open(url: &str, events: ChannelEvents) -> Result<Self, ChannelError> {
        log::info!("[PersistentChannel] Connecting to {}", url);

        let (writer, reader) = ws::connect(url)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("{e:#}")))?;

        let generation = events.generation();
        log::info!("[PersistentChannel] Connected (generation {})", generation);

        let reader_task = tokio::spawn(forward_inbound(reader, events));

        Ok(Self {
            writer,
            reader_task,
            generation,
        })
    }
}

#[async_trait]
impl PersistentChannel for WebSocketChannel {
    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.writer
            .send_text(text)
            .await
            .map_err(|e| ChannelError::SendFailed(format!("{e:#}")))
    }

    async fn close(&mut self) {
        log::debug!("[PersistentChannel] Closing generation {}", self.generation);
        if let Err(e) = self.writer.close().await {
            log::debug!("[PersistentChannel] Close handshake failed: {}", e);
        }
        self.reader_task.abort();
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Reader loop: one `ChannelEvent` per inbound frame, then `Closed`.
async fn forward_inbound(mut reader: WsReader, events: ChannelEvents) {
    loop {
        let event = match reader.recv().await {
            Some(Ok(WsMessage::Text(text))) => ChannelEvent::Message(text),
            Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => ChannelEvent::Message(text),
                Err(e) => {
                    log::warn!("[PersistentChannel] Dropping non-UTF-8 binary frame: {}", e);
                    continue;
                }
            },
            Some(Ok(WsMessage::Close { code, reason })) => {
                log::info!(
                    "[PersistentChannel] Closed by server (code={}, reason={:?})",
                    code,
                    reason
                );
                break;
            }
            Some(Err(e)) => {
                log::warn!("[PersistentChannel] {}", e);
                events.emit(ChannelEvent::Error(e.to_string()));
                break;
            }
            None => {
                log::info!("[PersistentChannel] Stream ended");
                break;
            }
        };

        if !events.emit(event) {
            log::debug!("[PersistentChannel] Supervisor gone, stopping reader");
            return;
        }
    }

    events.emit(ChannelEvent::Closed);
}
