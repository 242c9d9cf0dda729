//! Protocol events and wire shapes shared by both transport channels.
//!
//! Both the persistent channel and the one-shot streaming body carry the same
//! JSON object per event:
//!
//! ```text
//! { "type": "status" | "chunk" | "complete" | "error", "content": "...", "session_id": "..." }
//! ```
//!
//! `content` is absent for `complete`. `session_id` is stamped by the server
//! on every frame and is not needed by the client.

use serde::{Deserialize, Serialize};

/// A normalized unit of streamed communication for one logical response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Progress text from the producer. Rendered inline like a chunk.
    Status(String),
    /// A fragment of the assistant's answer.
    Chunk(String),
    /// The response is finished.
    Complete,
    /// The producer failed. Terminates the response.
    Error(String),
}

impl ProtocolEvent {
    /// Returns `true` for events that end a response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }

    /// Short name of the event kind, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Chunk(_) => "chunk",
            Self::Complete => "complete",
            Self::Error(_) => "error",
        }
    }
}

/// Raw wire frame before the `type` discriminator is interpreted.
///
/// `kind` stays a string so unknown types can be dropped instead of failing
/// the whole decode.
#[derive(Debug, Deserialize)]
pub(crate) struct WireFrame {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
}

impl WireFrame {
    /// Map the frame onto a [`ProtocolEvent`], or `None` for unknown types.
    pub(crate) fn into_event(self) -> Option<ProtocolEvent> {
        let content = self.content.unwrap_or_default();
        match self.kind.as_str() {
            "status" => Some(ProtocolEvent::Status(content)),
            "chunk" => Some(ProtocolEvent::Chunk(content)),
            "complete" => Some(ProtocolEvent::Complete),
            "error" => Some(ProtocolEvent::Error(content)),
            _ => None,
        }
    }
}

/// Outbound payload written to the persistent channel.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingFrame<'a> {
    /// The user's message text.
    pub message: &'a str,
}

/// Body of the one-shot streaming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// The user's message text.
    pub message: String,
    /// Session the message belongs to.
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_frame_maps_known_types() {
        let frame: WireFrame =
            serde_json::from_str(r#"{"type":"chunk","content":"hi","session_id":"s1"}"#)
                .expect("valid frame");
        assert_eq!(frame.into_event(), Some(ProtocolEvent::Chunk("hi".into())));

        let frame: WireFrame = serde_json::from_str(r#"{"type":"complete"}"#).expect("valid");
        assert_eq!(frame.into_event(), Some(ProtocolEvent::Complete));
    }

    #[test]
    fn test_wire_frame_unknown_type_is_dropped() {
        let frame: WireFrame =
            serde_json::from_str(r#"{"type":"typing","content":"x"}"#).expect("valid frame");
        assert_eq!(frame.into_event(), None);
    }

    #[test]
    fn test_missing_content_defaults_to_empty() {
        let frame: WireFrame = serde_json::from_str(r#"{"type":"error"}"#).expect("valid frame");
        assert_eq!(frame.into_event(), Some(ProtocolEvent::Error(String::new())));
    }

    #[test]
    fn test_outgoing_payload_shapes() {
        let frame = serde_json::to_value(OutgoingFrame { message: "hello" }).expect("serializable");
        assert_eq!(frame, serde_json::json!({ "message": "hello" }));

        let request = serde_json::to_value(ChatRequest {
            message: "hello".into(),
            session_id: "session_1".into(),
        })
        .expect("serializable");
        assert_eq!(
            request,
            serde_json::json!({ "message": "hello", "session_id": "session_1" })
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProtocolEvent::Complete.is_terminal());
        assert!(ProtocolEvent::Error("boom".into()).is_terminal());
        assert!(!ProtocolEvent::Chunk("a".into()).is_terminal());
        assert!(!ProtocolEvent::Status("a".into()).is_terminal());
    }
}
