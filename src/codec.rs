//! Frame codec: wire frames of every protocol to and from [`InternalEvent`].
//!
//! Decoding never panics on bad input. `Ok(None)` is a well-formed frame that
//! carries nothing to forward (keepalives, session bookkeeping, empty text).
//! Protocol quirks such as base64 audio inside JSON stay inside the protocol
//! modules; audio payloads come out byte-for-byte.

pub mod client;
pub mod realtime;
pub mod retell;
pub mod voiceflow;

use crate::config::AdapterConfig;
use crate::connection::Frame;
use crate::error::{DecodeError, EncodeError};
use voice_relay_types::{InternalEvent, Protocol};

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    /// Sample rate stamped on audio whose envelope does not carry one.
    sample_rate: u32,
    llm_binary_audio: bool,
}

impl FrameCodec {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            llm_binary_audio: false,
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.sample_rate).with_llm_binary_audio(config.llm_binary_audio)
    }

    pub fn with_llm_binary_audio(mut self, binary: bool) -> Self {
        self.llm_binary_audio = binary;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn decode(&self, frame: &Frame, protocol: Protocol) -> Result<Option<InternalEvent>, DecodeError> {
        match protocol {
            Protocol::Client => client::decode(frame, self.sample_rate),
            Protocol::LlmDirect => realtime::decode(frame, self.sample_rate),
            Protocol::Retell => retell::decode(frame, self.sample_rate),
            Protocol::VoiceFlow => voiceflow::decode(frame, self.sample_rate),
        }
    }

    /// Encodes one event. Some events expand to several frames (an LLM text
    /// turn is an item plus a response request), some to none.
    pub fn encode(&self, event: &InternalEvent, protocol: Protocol) -> Result<Vec<Frame>, EncodeError> {
        match protocol {
            Protocol::Client => client::encode(event),
            Protocol::LlmDirect => realtime::encode(event, self.llm_binary_audio),
            Protocol::Retell => retell::encode(event, None),
            Protocol::VoiceFlow => voiceflow::encode(event),
        }
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T, protocol: Protocol) -> Result<Frame, EncodeError> {
    serde_json::to_string(value)
        .map(Frame::Text)
        .map_err(|source| EncodeError::Serialize { protocol, source })
}

pub(crate) fn from_json<'a, T: serde::Deserialize<'a>>(text: &'a str, protocol: Protocol) -> Result<T, DecodeError> {
    serde_json::from_str(text).map_err(|e| DecodeError::new(protocol, e.to_string(), text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_types::{ControlKind, Role};

    #[test]
    fn client_text_roundtrip() {
        let codec = FrameCodec::new(16000);
        let event = InternalEvent::text(Role::Assistant, "How can I help?");

        let frames = codec.encode(&event, Protocol::Client).unwrap();
        assert_eq!(frames.len(), 1);
        let decoded = codec.decode(&frames[0], Protocol::Client).unwrap();
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn retell_audio_passthrough_roundtrip() {
        let codec = FrameCodec::new(8000);
        let audio: Vec<u8> = (0..=255).collect();
        let event = InternalEvent::audio(audio.clone(), 0, 8000);

        let frames = codec.encode(&event, Protocol::Retell).unwrap();
        assert_eq!(frames, vec![Frame::binary(audio.clone())]);
        let decoded = codec.decode(&frames[0], Protocol::Retell).unwrap().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn malformed_frames_are_decode_errors_for_every_protocol() {
        let codec = FrameCodec::new(24000);
        let garbage = Frame::text("{not json");
        for protocol in [Protocol::Client, Protocol::LlmDirect, Protocol::Retell, Protocol::VoiceFlow] {
            let err = codec.decode(&garbage, protocol).unwrap_err();
            assert_eq!(err.protocol, protocol);
            assert_eq!(err.raw_snippet, "{not json");
        }
    }

    #[test]
    fn control_only_events_encode_to_nothing_on_backends() {
        let codec = FrameCodec::new(24000);
        let turn_end = InternalEvent::control(ControlKind::TurnEnd);
        assert!(codec.encode(&turn_end, Protocol::LlmDirect).unwrap().is_empty());
        assert!(codec.encode(&turn_end, Protocol::Retell).unwrap().is_empty());
        assert!(codec.encode(&turn_end, Protocol::VoiceFlow).unwrap().is_empty());
    }
}
