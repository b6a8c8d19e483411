//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the viewer and the API server
//! for a document's chat session.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use page_lens_core::chat::ChatEvent;
use page_lens_core::domain::{ChatMessage, ChatRole, TurnState};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a new turn. `image` is a base64 PNG, optionally as a `data:` URL.
    Send {
        prompt: String,
        #[serde(default)]
        image: Option<String>,
    },

    /// Wipes the conversation, including any reply still streaming in.
    Clear,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// A chat message as the viewer renders it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatMessageFrame {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub is_streaming: bool,
}

impl From<&ChatMessage> for ChatMessageFrame {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            image: message.image_bytes.as_deref().map(|bytes| STANDARD.encode(bytes)),
            is_streaming: message.is_streaming,
        }
    }
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the upgrade: the restored conversation.
    History {
        messages: Vec<ChatMessageFrame>,
        state: TurnState,
    },

    /// A user message and an empty, streaming assistant message were appended.
    TurnStarted { user: ChatMessageFrame },

    /// A fragment to append to the streaming assistant message.
    Delta { text: String },

    Completed { content: String },

    /// The turn failed; `error` is also the assistant message's content.
    Failed { error: String },

    Cleared,

    /// A client frame was rejected. The session itself is unaffected.
    Error { message: String },
}

impl From<&ChatEvent> for ServerMessage {
    fn from(event: &ChatEvent) -> Self {
        match event {
            ChatEvent::TurnStarted { user } => ServerMessage::TurnStarted { user: user.into() },
            ChatEvent::Delta { text } => ServerMessage::Delta { text: text.clone() },
            ChatEvent::Completed { content } => ServerMessage::Completed {
                content: content.clone(),
            },
            ChatEvent::Failed { error } => ServerMessage::Failed {
                error: error.clone(),
            },
            ChatEvent::Cleared => ServerMessage::Cleared,
        }
    }
}

/// Decodes an attached image, accepting either bare base64 or a `data:` URL.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    STANDARD.decode(payload.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frames_are_tagged_by_type() {
        let send: ClientMessage =
            serde_json::from_value(json!({"type": "send", "prompt": "What is this?"})).unwrap();
        assert_eq!(
            send,
            ClientMessage::Send {
                prompt: "What is this?".to_string(),
                image: None
            }
        );
        let clear: ClientMessage = serde_json::from_value(json!({"type": "clear"})).unwrap();
        assert_eq!(clear, ClientMessage::Clear);
        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "init"})).is_err());
    }

    #[test]
    fn events_become_server_frames() {
        let user = ChatMessage::user("Explain", Some(vec![1, 2, 3]));
        let frame = serde_json::to_value(ServerMessage::from(&ChatEvent::TurnStarted { user }))
            .unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "turn_started",
                "user": {"role": "user", "content": "Explain", "image": "AQID", "is_streaming": false}
            })
        );

        let delta = serde_json::to_value(ServerMessage::from(&ChatEvent::Delta {
            text: "Hel".to_string(),
        }))
        .unwrap();
        assert_eq!(delta, json!({"type": "delta", "text": "Hel"}));
        assert_eq!(
            serde_json::to_value(ServerMessage::from(&ChatEvent::Cleared)).unwrap(),
            json!({"type": "cleared"})
        );
    }

    #[test]
    fn images_may_arrive_as_data_urls() {
        assert_eq!(decode_image("AQID").unwrap(), vec![1, 2, 3]);
        assert_eq!(
            decode_image("data:image/png;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
        assert!(decode_image("not base64!").is_err());
    }
}
