use std::fmt;
use std::str::FromStr;

/// The backend a session is bridged to. Selected once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// A realtime LLM websocket API.
    #[serde(alias = "llm", alias = "openai")]
    LlmDirect,
    Retell,
    #[serde(alias = "voiceflow")]
    VoiceFlow,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::LlmDirect => "llm_direct",
            BackendType::Retell => "retell",
            BackendType::VoiceFlow => "voice_flow",
        }
    }

    /// The wire protocol spoken on this backend's socket.
    pub fn protocol(&self) -> Protocol {
        match self {
            BackendType::LlmDirect => Protocol::LlmDirect,
            BackendType::Retell => Protocol::Retell,
            BackendType::VoiceFlow => Protocol::VoiceFlow,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown backend '{}', expected one of: llm, retell, voiceflow", self.0)
    }
}

impl std::error::Error for UnknownBackend {}

impl FromStr for BackendType {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "llm" | "llm_direct" | "llmdirect" | "openai" => Ok(BackendType::LlmDirect),
            "retell" => Ok(BackendType::Retell),
            "voiceflow" | "voice_flow" => Ok(BackendType::VoiceFlow),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Every wire protocol the codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// The client-facing socket.
    Client,
    LlmDirect,
    Retell,
    VoiceFlow,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Client => "client",
            Protocol::LlmDirect => "llm_direct",
            Protocol::Retell => "retell",
            Protocol::VoiceFlow => "voice_flow",
        };
        f.write_str(name)
    }
}
