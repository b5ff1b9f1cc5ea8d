//! Retell websocket messages.
//!
//! Retell tags what it sends with `interaction_type` and expects replies
//! tagged with `response_type`. Everything else is carried through unchanged.

/// Messages sent by Retell.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "interaction_type", rename_all = "snake_case")]
pub enum RetellRequest {
    /// Keepalive, must be answered with a `ping_pong` response.
    PingPong {
        #[serde(default)]
        timestamp: i64,
    },
    CallDetails {
        #[serde(default)]
        call: serde_json::Value,
    },
    /// Transcript update, no response expected.
    UpdateOnly {
        #[serde(default)]
        transcript: Vec<Utterance>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turntaking: Option<String>,
    },
    ResponseRequired {
        response_id: i64,
        #[serde(default)]
        transcript: Vec<Utterance>,
    },
    ReminderRequired {
        response_id: i64,
        #[serde(default)]
        transcript: Vec<Utterance>,
    },
    #[serde(other)]
    Other,
}

impl RetellRequest {
    /// The response id Retell is waiting on, if this message asks for one.
    pub fn response_id(&self) -> Option<i64> {
        match self {
            RetellRequest::ResponseRequired { response_id, .. }
            | RetellRequest::ReminderRequired { response_id, .. } => Some(*response_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Utterance {
    /// "agent" or "user"
    role: String,
    content: String,
}

impl Utterance {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_agent(&self) -> bool {
        self.role == "agent"
    }
}

/// Messages sent to Retell.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "response_type", rename_all = "snake_case")]
pub enum RetellResponse {
    Config {
        config: RetellConfig,
    },
    PingPong {
        timestamp: i64,
    },
    Response {
        response_id: i64,
        content: String,
        content_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_call: Option<bool>,
    },
    AgentInterrupt {
        interrupt_id: i64,
        content: String,
        content_complete: bool,
        no_interruption_allowed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetellConfig {
    auto_reconnect: bool,
    call_details: bool,
    transcript_with_tool_calls: bool,
}

impl Default for RetellConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            call_details: true,
            transcript_with_tool_calls: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_response_required() {
        let json = r#"{
            "interaction_type": "response_required",
            "response_id": 7,
            "transcript": [
                {"role": "agent", "content": "Hi there"},
                {"role": "user", "content": "I need help"}
            ]
        }"#;
        let request: RetellRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.response_id(), Some(7));
        match request {
            RetellRequest::ResponseRequired { transcript, .. } => {
                assert_eq!(transcript.last().map(|u| u.content()), Some("I need help"));
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn config_response_matches_retell_shape() {
        let config = RetellResponse::Config {
            config: RetellConfig::default(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["response_type"], "config");
        assert_eq!(json["config"]["auto_reconnect"], true);
        assert_eq!(json["config"]["transcript_with_tool_calls"], true);
    }
}
