//! VoiceFlow dialog runtime request bodies and response traces.

/// Body of a `POST /state/user/{user_id}/interact` request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InteractRequest {
    action: Action,
}

impl InteractRequest {
    pub fn launch() -> Self {
        Self {
            action: Action::Launch,
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            action: Action::Text {
                payload: text.to_string(),
            },
        }
    }

    pub fn audio(audio: String, sequence: u64, sample_rate: u32) -> Self {
        Self {
            action: Action::Audio {
                payload: AudioPayload {
                    audio,
                    sequence,
                    sample_rate,
                },
            },
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Launch,
    Text { payload: String },
    Audio { payload: AudioPayload },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPayload {
    /// Base64 encoded audio bytes.
    pub audio: String,
    pub sequence: u64,
    pub sample_rate: u32,
}

/// One element of the trace array returned by the runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Speak {
        #[serde(default)]
        payload: SpeakPayload,
    },
    Text {
        #[serde(default)]
        payload: SpeakPayload,
    },
    End,
    /// Visual, choice and other traces the relay does not forward.
    #[serde(other)]
    Other,
}

impl Trace {
    pub fn text(message: &str) -> Self {
        Trace::Text {
            payload: SpeakPayload {
                message: Some(message.to_string()),
                src: None,
            },
        }
    }

    /// The message of a `speak` or `text` trace, if it has a non-empty one.
    pub fn message(&self) -> Option<&str> {
        match self {
            Trace::Speak { payload } | Trace::Text { payload } => {
                payload.message.as_deref().filter(|m| !m.is_empty())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeakPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Audio as a `data:audio/...;base64,` URL on `speak` traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_match_interact_api() {
        let launch = serde_json::to_string(&InteractRequest::launch()).unwrap();
        assert_eq!(launch, r#"{"action":{"type":"launch"}}"#);

        let text = serde_json::to_string(&InteractRequest::text("hello")).unwrap();
        assert_eq!(text, r#"{"action":{"type":"text","payload":"hello"}}"#);
    }

    #[test]
    fn parses_trace_array() {
        let json = r#"[
            {"type": "speak", "payload": {"message": "Welcome!"}},
            {"type": "visual", "payload": {"image": "x.png"}},
            {"type": "end"}
        ]"#;
        let traces: Vec<Trace> = serde_json::from_str(json).unwrap();
        assert_eq!(traces.len(), 3);
        assert_eq!(traces[0].message(), Some("Welcome!"));
        assert_eq!(traces[1], Trace::Other);
        assert_eq!(traces[2], Trace::End);
    }
}
