use bytes::Bytes;
use std::fmt;

/// The protocol-agnostic unit of conversation exchanged between the codec,
/// the adapters and the session pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    AudioChunk(AudioChunk),
    TextMessage(TextMessage),
    ControlSignal(ControlSignal),
}

impl InternalEvent {
    pub fn audio(data: impl Into<Bytes>, sequence: u64, sample_rate: u32) -> Self {
        Self::AudioChunk(AudioChunk {
            data: data.into(),
            sequence,
            sample_rate,
        })
    }

    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self::TextMessage(TextMessage {
            role,
            content: content.into(),
        })
    }

    pub fn control(kind: ControlKind) -> Self {
        Self::ControlSignal(ControlSignal { kind, payload: None })
    }

    pub fn control_with(kind: ControlKind, payload: impl Into<String>) -> Self {
        Self::ControlSignal(ControlSignal {
            kind,
            payload: Some(payload.into()),
        })
    }

    pub fn error(cause: ErrorCause, message: impl Into<String>) -> Self {
        Self::control_with(ControlKind::Error(cause), message)
    }

    /// Returns the control kind when this event is a control signal.
    pub fn control_kind(&self) -> Option<&ControlKind> {
        match self {
            Self::ControlSignal(signal) => Some(&signal.kind),
            _ => None,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self.control_kind(), Some(ControlKind::Interrupt))
    }

    pub fn is_session_end(&self) -> bool {
        matches!(self.control_kind(), Some(ControlKind::SessionEnd))
    }

    /// Short name used in log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AudioChunk(_) => "audio",
            Self::TextMessage(_) => "text",
            Self::ControlSignal(signal) => signal.kind.as_str(),
        }
    }
}

/// A chunk of audio. The payload is carried byte-for-byte; only the envelope
/// fields are interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub data: Bytes,
    /// Per-direction sequence number, starting at 1. `0` means the wire
    /// envelope did not carry one and the session has not stamped it yet.
    pub sequence: u64,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlSignal {
    pub kind: ControlKind,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    SessionStart,
    SessionEnd,
    /// Barge-in: the user started speaking over an in-progress response.
    Interrupt,
    /// The backend finished its turn (`response.done` and friends).
    TurnEnd,
    Error(ErrorCause),
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::SessionStart => "start",
            ControlKind::SessionEnd => "end",
            ControlKind::Interrupt => "interrupt",
            ControlKind::TurnEnd => "turn_end",
            ControlKind::Error(_) => "error",
        }
    }
}

/// Why a session or a backend reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
    Timeout,
    Authentication,
    Rejected,
    Transport,
    Backend,
}

impl ErrorCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCause::Timeout => "timeout",
            ErrorCause::Authentication => "authentication",
            ErrorCause::Rejected => "rejected",
            ErrorCause::Transport => "transport",
            ErrorCause::Backend => "backend",
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_helpers_classify_events() {
        assert!(InternalEvent::control(ControlKind::Interrupt).is_interrupt());
        assert!(InternalEvent::control(ControlKind::SessionEnd).is_session_end());
        assert!(!InternalEvent::text(Role::User, "hi").is_session_end());
        assert_eq!(InternalEvent::error(ErrorCause::Timeout, "slow").kind_name(), "error");
    }

    #[test]
    fn error_cause_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCause::Authentication).unwrap();
        assert_eq!(json, "\"authentication\"");
    }
}
