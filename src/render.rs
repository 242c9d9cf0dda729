//! Rendering collaborator boundary.
//!
//! The supervisor is the only caller of [`Renderer`]. Everything it passes is
//! either plain text meant to be shown as text (`delta`, notification text) or
//! markup produced by [`crate::format`] (`rendered`, `formatted`). Raw
//! assistant output is never handed over as markup.
//!
//! [`TerminalRenderer`] is the renderer used by the binary.

use std::io::Write;
use std::time::Duration;

use crate::assembler::FinishedMessage;

/// Identifies one notification so it can be dismissed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification_{}", self.0)
    }
}

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Informational, short-lived.
    Info,
    /// Error, shown longer than informational notices.
    Error,
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A transient message shown outside the assistant's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Plain text to display.
    pub text: String,
    /// How long it stays before the supervisor dismisses it.
    pub ttl: Duration,
}

/// Presentation surface driven by the supervisor.
///
/// All calls happen on the supervisor task, one at a time.
pub trait Renderer: Send {
    /// Show the "assistant is composing" placeholder for a new response.
    fn start_response(&mut self);

    /// The open response grew.
    ///
    /// `delta` is the new plain text; `rendered` is the whole buffer escaped
    /// with line breaks converted, ready to replace the displayed content.
    fn append_response(&mut self, delta: &str, rendered: &str);

    /// The open response is complete and formatted.
    fn finish_response(&mut self, message: &FinishedMessage);

    /// Show a transient notification.
    fn show_notification(&mut self, id: NotificationId, notification: &Notification);

    /// Remove a notification whose display interval elapsed.
    fn dismiss_notification(&mut self, id: NotificationId);

    /// The open response was abandoned after the transport dropped.
    ///
    /// Whatever was already appended stays as it is.
    fn abandon_response(&mut self) {}

    /// The user's message was accepted for sending.
    fn user_message(&mut self, _text: &str) {}

    /// Whether the persistent channel is up.
    fn sending_enabled(&mut self, _enabled: bool) {}
}

/// Renderer for an interactive terminal.
///
/// Streams response text to stdout as it arrives and writes notifications to
/// stderr. Terminal output cannot be retracted, so dismissals are no-ops.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    /// Whether any text has been printed for the open response.
    streaming: bool,
}

impl TerminalRenderer {
    /// Create a terminal renderer.
    pub fn new() -> Self {
        Self::default()
    }

    fn flush() {
        let _ = std::io::stdout().flush();
    }
}

impl Renderer for TerminalRenderer {
    fn start_response(&mut self) {
        self.streaming = false;
        print!("assistant> ...");
        Self::flush();
    }

    fn append_response(&mut self, delta: &str, _rendered: &str) {
        if !self.streaming {
            // Replace the placeholder dots
            print!("\u{8}\u{8}\u{8}   \u{8}\u{8}\u{8}");
            self.streaming = true;
        }
        print!("{delta}");
        Self::flush();
    }

    fn finish_response(&mut self, message: &FinishedMessage) {
        if !self.streaming && message.raw().is_empty() {
            print!("\u{8}\u{8}\u{8}(no content)");
        }
        println!();
        self.streaming = false;
    }

    fn show_notification(&mut self, id: NotificationId, notification: &Notification) {
        log::debug!("[TerminalRenderer] Showing {}", id);
        eprintln!("[{}] {}", notification.level, notification.text);
    }

    fn dismiss_notification(&mut self, id: NotificationId) {
        log::trace!("[TerminalRenderer] {} expired", id);
    }

    fn abandon_response(&mut self) {
        println!(" [interrupted]");
        self.streaming = false;
    }

    fn sending_enabled(&mut self, enabled: bool) {
        if enabled {
            log::info!("[TerminalRenderer] Live connection available");
        } else {
            log::info!("[TerminalRenderer] Live connection lost, messages will use HTTP");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_id_display() {
        assert_eq!(NotificationId(7).to_string(), "notification_7");
    }

    #[test]
    fn test_level_display() {
        assert_eq!(NotificationLevel::Info.to_string(), "info");
        assert_eq!(NotificationLevel::Error.to_string(), "error");
    }
}
