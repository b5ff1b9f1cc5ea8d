//! JSON envelopes spoken on the client-facing socket.
//!
//! Binary frames on that socket are raw audio and have no envelope. JSON
//! frames either carry a `type` tag ([`ClientControl`]) or are plain text
//! messages ([`ClientText`]), which is the shape existing chat clients send:
//! `{"content": "hello"}`.

use crate::event::{ErrorCause, Role};

/// A plain conversational text message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClientText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    content: String,
}

impl ClientText {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role: Some(role),
            content: content.to_string(),
        }
    }

    /// Messages without a role come from the person talking to the relay.
    pub fn role(&self) -> Role {
        self.role.unwrap_or(Role::User)
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Typed client messages, tagged by `type`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    /// Audio wrapped in JSON for clients that cannot send binary frames.
    Audio {
        /// Base64 encoded audio bytes.
        audio: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
    },
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    End {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Interrupt,
    TurnEnd,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<ErrorCause>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

/// Content sent with the `end` message when the conversation is over.
pub const CONVERSATION_ENDED: &str = "Conversation ended";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_message_matches_client_contract() {
        let end = ClientControl::End {
            content: Some(CONVERSATION_ENDED.to_string()),
        };
        let json = serde_json::to_string(&end).unwrap();
        assert_eq!(json, r#"{"type":"end","content":"Conversation ended"}"#);
    }

    #[test]
    fn text_without_role_defaults_to_user() {
        let text: ClientText = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(text.role(), Role::User);
        assert_eq!(text.content(), "hello");
    }

    #[test]
    fn error_message_carries_cause() {
        let msg: ClientControl =
            serde_json::from_str(r#"{"type":"error","cause":"timeout","content":"slow"}"#).unwrap();
        assert_eq!(
            msg,
            ClientControl::Error {
                cause: Some(ErrorCause::Timeout),
                content: Some("slow".to_string()),
            }
        );
    }
}
