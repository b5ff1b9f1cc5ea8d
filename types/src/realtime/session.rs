/// The `session` object of a `session.update` event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    /// The set of modalities the model can respond with. To disable audio, set this to ["text"].
    modalities: Vec<String>,

    /// The default system instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    /// The format of input audio, "pcm16" for the relay.
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_format: Option<String>,

    /// Configuration for input audio transcription. Can be set to null to turn off
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<serde_json::Value>,

    /// Configuration for turn detection. Can be set to null to turn off
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_detection: Option<serde_json::Value>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn modalities(&self) -> &[String] {
        &self.modalities
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }
}

pub struct SessionBuilder {
    session: Session,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            session: Session {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: None,
                input_audio_format: None,
                output_audio_format: None,
                input_audio_transcription: None,
                turn_detection: None,
            },
        }
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.session.instructions = Some(instructions.to_string());
        self
    }

    /// Uses the same audio format in both directions.
    pub fn with_audio_format(mut self, format: &str) -> Self {
        self.session.input_audio_format = Some(format.to_string());
        self.session.output_audio_format = Some(format.to_string());
        self
    }

    pub fn with_input_audio_transcription(mut self, model: &str) -> Self {
        self.session.input_audio_transcription = Some(serde_json::json!({ "model": model }));
        self
    }

    pub fn with_server_vad(mut self) -> Self {
        self.session.turn_detection = Some(serde_json::json!({ "type": "server_vad" }));
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}
