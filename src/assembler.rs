//! Folds the protocol events of one response into display state.
//!
//! # Lifecycle
//!
//! ```text
//!          begin()            status/chunk            complete/error
//!  Idle ─────────────> Pending ─────────────> Open ─────────────────> Idle
//!   ▲                     │                    │                        (FinishedMessage)
//!   │                     └── complete/error ──┴──> Idle (empty or partial message)
//!   └──────────── abandon() from Pending/Open ──────
//! ```
//!
//! The [`AccumulatedMessage`] lives only inside the `Open` phase and is
//! consumed by [`AccumulatedMessage::freeze`], so a finished response cannot
//! be mutated by a late event. Events that arrive while `Idle` belong to a
//! response that already ended and are dropped.

use crate::format::{format_message, render_plain};
use crate::protocol::ProtocolEvent;
use crate::render::Renderer;

/// Mutable text buffer of the response currently streaming.
#[derive(Debug, Default)]
pub struct AccumulatedMessage {
    raw: String,
}

impl AccumulatedMessage {
    /// Raw text accumulated so far.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Mid-stream rendering: escaped text with line breaks only.
    pub fn rendered(&self) -> String {
        render_plain(&self.raw)
    }

    fn push(&mut self, text: &str) {
        self.raw.push_str(text);
    }

    /// Close the buffer and apply final formatting, exactly once.
    pub fn freeze(self) -> FinishedMessage {
        let formatted = format_message(&self.raw);
        FinishedMessage {
            raw: self.raw,
            formatted,
        }
    }
}

/// Immutable result of a completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedMessage {
    raw: String,
    formatted: String,
}

impl FinishedMessage {
    /// Raw concatenation of every chunk and status payload.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Display markup produced by [`format_message`].
    pub fn formatted(&self) -> &str {
        &self.formatted
    }
}

/// Where the assembler is in the current response.
#[derive(Debug, Default)]
enum Phase {
    /// No response in flight.
    #[default]
    Idle,
    /// A message was sent; the placeholder is showing, no content yet.
    Pending,
    /// Content is streaming into the buffer.
    Open(AccumulatedMessage),
}

/// What applying one event did.
#[derive(Debug, PartialEq, Eq)]
pub enum Applied {
    /// The event had no effect (straggler or non-content event while idle).
    Ignored,
    /// The open response grew.
    Updated,
    /// The response ended. Carries the frozen message.
    Finished(FinishedMessage),
}

/// Accumulates one response at a time and drives the renderer.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    phase: Phase,
}

impl StreamAssembler {
    /// Create an idle assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a response is pending or open.
    pub fn in_flight(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// The open buffer, if content has started arriving.
    pub fn open_message(&self) -> Option<&AccumulatedMessage> {
        match &self.phase {
            Phase::Open(message) => Some(message),
            _ => None,
        }
    }

    /// Start a new response and show its placeholder.
    pub fn begin(&mut self, renderer: &mut dyn Renderer) {
        if self.in_flight() {
            log::warn!("[StreamAssembler] New response started while one was in flight");
            renderer.abandon_response();
        }
        self.phase = Phase::Pending;
        renderer.start_response();
    }

    /// Apply one protocol event of the current response.
    pub fn apply(&mut self, event: ProtocolEvent, renderer: &mut dyn Renderer) -> Applied {
        match event {
            ProtocolEvent::Status(text) | ProtocolEvent::Chunk(text) => self.append(&text, renderer),
            ProtocolEvent::Complete => self.finish(renderer),
            ProtocolEvent::Error(_) => {
                // The error text is a notification, not part of the message
                self.finish(renderer)
            }
        }
    }

    /// Drop the response in flight without formatting it.
    ///
    /// Returns `true` if there was one.
    pub fn abandon(&mut self, renderer: &mut dyn Renderer) -> bool {
        match std::mem::take(&mut self.phase) {
            Phase::Idle => false,
            Phase::Pending | Phase::Open(_) => {
                log::info!("[StreamAssembler] Abandoning response in flight");
                renderer.abandon_response();
                true
            }
        }
    }

    fn append(&mut self, text: &str, renderer: &mut dyn Renderer) -> Applied {
        match self.phase {
            Phase::Idle => {
                log::debug!(
                    "[StreamAssembler] Dropping {} bytes for a response that already ended",
                    text.len()
                );
                return Applied::Ignored;
            }
            Phase::Pending => self.phase = Phase::Open(AccumulatedMessage::default()),
            Phase::Open(_) => {}
        }
        let Phase::Open(message) = &mut self.phase else {
            return Applied::Ignored;
        };

        message.push(text);
        renderer.append_response(text, &message.rendered());
        Applied::Updated
    }

    fn finish(&mut self, renderer: &mut dyn Renderer) -> Applied {
        let finished = match std::mem::take(&mut self.phase) {
            Phase::Idle => {
                log::debug!("[StreamAssembler] Ignoring terminal event with no response in flight");
                return Applied::Ignored;
            }
            Phase::Pending => AccumulatedMessage::default().freeze(),
            Phase::Open(message) => message.freeze(),
        };

        renderer.finish_response(&finished);
        Applied::Finished(finished)
    }
}
