use crate::realtime::Base64EncodedAudioBytes;

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    event_id: String,

    /// Details about the error
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn new(error: ErrorDetails) -> Self {
        Self {
            event_id: String::new(),
            error,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    message: String,
}

impl ErrorDetails {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error_type: error_type.to_string(),
            code: None,
            message: message.to_string(),
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `session.created` and `session.updated` events. The session resource is
/// not inspected by the relay.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionEvent {
    #[serde(default)]
    event_id: String,
}

impl SessionEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferSpeechStartedEvent {
    #[serde(default)]
    event_id: String,

    /// Milliseconds since the session started when speech was detected
    #[serde(default)]
    audio_start_ms: i32,
    /// The ID of the user message item that will be created when speech stops
    #[serde(default)]
    item_id: String,
}

impl InputAudioBufferSpeechStartedEvent {
    pub fn audio_start_ms(&self) -> i32 {
        self.audio_start_ms
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `conversation.item.input_audio_transcription.completed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemInputAudioTranscriptionCompletedEvent {
    #[serde(default)]
    event_id: String,

    /// The ID of the user message item
    #[serde(default)]
    item_id: String,

    /// The transcribed text
    transcript: String,
}

impl ConversationItemInputAudioTranscriptionCompletedEvent {
    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.audio.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDeltaEvent {
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    response_id: String,
    #[serde(default)]
    item_id: String,

    /// Base64 encoded audio data delta
    delta: Base64EncodedAudioBytes,
}

impl ResponseAudioDeltaEvent {
    pub fn new(response_id: &str, delta: Base64EncodedAudioBytes) -> Self {
        Self {
            event_id: String::new(),
            response_id: response_id.to_string(),
            item_id: String::new(),
            delta,
        }
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn delta(&self) -> &Base64EncodedAudioBytes {
        &self.delta
    }
}

/// `response.audio_transcript.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDoneEvent {
    #[serde(default)]
    event_id: String,

    /// The final transcript of the audio
    transcript: String,
}

impl ResponseAudioTranscriptDoneEvent {
    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.text.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseTextDoneEvent {
    #[serde(default)]
    event_id: String,

    /// The final text content
    text: String,
}

impl ResponseTextDoneEvent {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `response.done` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseDoneEvent {
    #[serde(default)]
    event_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<ResponseResource>,
}

impl ResponseDoneEvent {
    /// The final status of the response: "completed", "cancelled", "failed" or "incomplete".
    pub fn status(&self) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.status.as_deref())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: Option<String>,
}
