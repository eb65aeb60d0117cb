//! Streaming chat protocol.
//!
//! A chat response is a sequence of newline-terminated lines, one per event:
//!
//! ```text
//! event: context data: <payload>
//! event: token data: <payload>
//! event: error data: <message>
//! event: done
//! ```
//!
//! [`codec`] turns events into lines and lines back into events. [`client`]
//! drives the decoder over an HTTP response body.

pub mod client;
pub mod codec;

pub use client::{decode_response, EventReceiver, RagClient};
pub use codec::{encode_event, LineDecoder};

use serde::{Deserialize, Serialize};

/// One unit of the chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Retrieved reference material, sent once before any token.
    Context(String),
    Token(String),
    /// Terminal failure.
    Error(String),
    /// Terminal success.
    Done,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Context(_) => "context",
            StreamEvent::Token(_) => "token",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done => "done",
        }
    }

    /// Payload text; empty for `done`.
    pub fn payload(&self) -> &str {
        match self {
            StreamEvent::Context(p) | StreamEvent::Token(p) | StreamEvent::Error(p) => p,
            StreamEvent::Done => "",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error(_) | StreamEvent::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_terminals() {
        assert_eq!(StreamEvent::Context("c".into()).kind(), "context");
        assert_eq!(StreamEvent::Token("t".into()).payload(), "t");
        assert_eq!(StreamEvent::Done.payload(), "");
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error("e".into()).is_terminal());
        assert!(!StreamEvent::Token("t".into()).is_terminal());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(StreamEvent::Token("Hi".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "token", "payload": "Hi"}));
    }
}
