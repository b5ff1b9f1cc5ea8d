use voice_relay_types::{BackendType, ErrorCause, Protocol};

const SNIPPET_LEN: usize = 64;

/// A frame that could not be turned into an [`InternalEvent`](voice_relay_types::InternalEvent).
///
/// Decode errors on a single frame are recoverable: the caller logs and drops
/// the frame, unless it happened during a backend handshake.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to decode {protocol} frame: {reason} (raw: {raw_snippet:?})")]
pub struct DecodeError {
    pub protocol: Protocol,
    pub reason: String,
    pub raw_snippet: String,
}

impl DecodeError {
    pub fn new(protocol: Protocol, reason: impl Into<String>, raw: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(raw);
        let raw_snippet = match raw.char_indices().nth(SNIPPET_LEN) {
            Some((idx, _)) => format!("{}...", &raw[..idx]),
            None => raw.into_owned(),
        };
        Self {
            protocol,
            reason: reason.into(),
            raw_snippet,
        }
    }
}

/// An event that cannot be expressed in the target protocol.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{event} events cannot be sent over {protocol}")]
    Unsupported {
        event: &'static str,
        protocol: Protocol,
    },
    #[error("failed to serialize {protocol} frame: {source}")]
    Serialize {
        protocol: Protocol,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectCause {
    #[error("timed out")]
    Timeout,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("handshake rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectCause {
    pub fn error_cause(&self) -> ErrorCause {
        match self {
            ConnectCause::Timeout => ErrorCause::Timeout,
            ConnectCause::Authentication(_) => ErrorCause::Authentication,
            ConnectCause::Rejected(_) => ErrorCause::Rejected,
            ConnectCause::Transport(_) => ErrorCause::Transport,
        }
    }
}

/// The backend could not be connected or refused the handshake. Always fatal
/// to the session being created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to connect to {backend} backend: {cause}")]
pub struct ConnectError {
    pub backend: BackendType,
    pub cause: ConnectCause,
}

impl ConnectError {
    pub fn new(backend: BackendType, cause: ConnectCause) -> Self {
        Self { backend, cause }
    }

    pub fn timeout(backend: BackendType) -> Self {
        Self::new(backend, ConnectCause::Timeout)
    }
}

/// Unexpected socket failure while a session is streaming.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("connection closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("session task failed: {0}")]
    Task(String),
}

impl SessionError {
    pub fn transport(e: impl std::fmt::Display) -> Self {
        SessionError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_truncates_snippet() {
        let raw = "x".repeat(200);
        let err = DecodeError::new(Protocol::Client, "bad json", raw.as_bytes());
        assert_eq!(err.raw_snippet.len(), SNIPPET_LEN + 3);
        assert!(err.raw_snippet.ends_with("..."));
    }

    #[test]
    fn connect_error_maps_to_client_cause() {
        let err = ConnectError::timeout(BackendType::LlmDirect);
        assert_eq!(err.cause.error_cause(), ErrorCause::Timeout);
        assert_eq!(err.to_string(), "failed to connect to llm_direct backend: timed out");
    }
}
