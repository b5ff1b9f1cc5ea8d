use crate::codec::{from_json, to_json};
use crate::connection::Frame;
use crate::consts::{LLM_AUDIO_FORMAT, LLM_TRANSCRIPTION_MODEL};
use crate::error::{DecodeError, EncodeError};
use voice_relay_types::realtime::{
    ClientEvent, ConversationItemCreateEvent, InputAudioBufferAppendEvent, Item, MessageItem, ResponseCancelEvent,
    ResponseCreateEvent, ServerEvent, Session, SessionUpdateEvent,
};
use voice_relay_types::{ControlKind, ErrorCause, InternalEvent, Protocol, Role};
use voice_relay_utils::audio;

const PROTOCOL: Protocol = Protocol::LlmDirect;

pub fn decode(frame: &Frame, sample_rate: u32) -> Result<Option<InternalEvent>, DecodeError> {
    match frame {
        Frame::Binary(data) => Ok(Some(InternalEvent::audio(data.clone(), 0, sample_rate))),
        Frame::Text(text) => {
            let event: ServerEvent = from_json(text, PROTOCOL)?;
            server_event(event, sample_rate).map_err(|reason| DecodeError::new(PROTOCOL, reason, text.as_bytes()))
        }
    }
}

/// Maps one parsed server event. Handshake events map to `None`.
pub fn server_event(event: ServerEvent, sample_rate: u32) -> Result<Option<InternalEvent>, String> {
    let mapped = match event {
        ServerEvent::ResponseAudioDelta(e) => {
            let data = audio::decode(e.delta()).map_err(|e| format!("invalid base64 audio delta: {}", e))?;
            Some(InternalEvent::audio(data, 0, sample_rate))
        }
        ServerEvent::ResponseAudioTranscriptDone(e) => non_empty(Role::Assistant, e.transcript()),
        ServerEvent::ResponseTextDone(e) => non_empty(Role::Assistant, e.text()),
        ServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => non_empty(Role::User, e.transcript()),
        ServerEvent::InputAudioBufferSpeechStarted(_) => Some(InternalEvent::control(ControlKind::Interrupt)),
        ServerEvent::ResponseDone(e) => Some(match e.status() {
            Some(status) => InternalEvent::control_with(ControlKind::TurnEnd, status),
            None => InternalEvent::control(ControlKind::TurnEnd),
        }),
        ServerEvent::Error(e) => Some(InternalEvent::error(ErrorCause::Backend, e.error().message())),
        ServerEvent::SessionCreated(_) | ServerEvent::SessionUpdated(_) | ServerEvent::Other => None,
    };
    Ok(mapped)
}

fn non_empty(role: Role, text: &str) -> Option<InternalEvent> {
    let text = text.trim();
    (!text.is_empty()).then(|| InternalEvent::text(role, text))
}

pub fn encode(event: &InternalEvent, binary_audio: bool) -> Result<Vec<Frame>, EncodeError> {
    let events = match event {
        InternalEvent::AudioChunk(chunk) if binary_audio => return Ok(vec![Frame::Binary(chunk.data.clone())]),
        InternalEvent::AudioChunk(chunk) => vec![ClientEvent::InputAudioBufferAppend(
            InputAudioBufferAppendEvent::new(audio::encode(&chunk.data)),
        )],
        InternalEvent::TextMessage(message) => {
            let item = ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(Item::Message(
                MessageItem::from_text(message.role, &message.content),
            )));
            // Only user turns ask the model to answer.
            if message.role == Role::User {
                vec![item, ClientEvent::ResponseCreate(ResponseCreateEvent::new())]
            } else {
                vec![item]
            }
        }
        InternalEvent::ControlSignal(signal) => match signal.kind {
            ControlKind::Interrupt => vec![ClientEvent::ResponseCancel(ResponseCancelEvent::new())],
            ControlKind::SessionStart | ControlKind::SessionEnd | ControlKind::TurnEnd => Vec::new(),
            ControlKind::Error(_) => {
                return Err(EncodeError::Unsupported {
                    event: "error",
                    protocol: PROTOCOL,
                })
            }
        },
    };
    events.iter().map(|e| to_json(e, PROTOCOL)).collect()
}

/// The `session.update` sent right after the socket opens.
pub fn session_update(system_prompt: Option<&str>) -> Result<Frame, EncodeError> {
    let mut builder = Session::builder()
        .with_audio_format(LLM_AUDIO_FORMAT)
        .with_input_audio_transcription(LLM_TRANSCRIPTION_MODEL)
        .with_server_vad();
    if let Some(prompt) = system_prompt {
        builder = builder.with_instructions(prompt);
    }
    to_json(&ClientEvent::SessionUpdate(SessionUpdateEvent::new(builder.build())), PROTOCOL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(frame: &Frame) -> serde_json::Value {
        match frame {
            Frame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    #[test]
    fn audio_delta_decodes_to_raw_bytes() {
        let frame = Frame::text(format!(
            r#"{{"type":"response.audio.delta","response_id":"r1","item_id":"i1","output_index":0,"content_index":0,"delta":"{}"}}"#,
            audio::encode(&[10, 20, 30])
        ));
        let event = decode(&frame, 24000).unwrap().unwrap();
        assert_eq!(event, InternalEvent::audio(vec![10u8, 20, 30], 0, 24000));
    }

    #[test]
    fn speech_started_is_a_barge_in() {
        let frame = Frame::text(r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120,"item_id":"i2"}"#);
        assert!(decode(&frame, 24000).unwrap().unwrap().is_interrupt());
    }

    #[test]
    fn transcripts_keep_their_speaker() {
        let user = Frame::text(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i","content_index":0,"transcript":"book a table"}"#,
        );
        assert_eq!(decode(&user, 24000).unwrap(), Some(InternalEvent::text(Role::User, "book a table")));

        let assistant = Frame::text(r#"{"type":"response.text.done","response_id":"r","item_id":"i","text":"Done."}"#);
        assert_eq!(
            decode(&assistant, 24000).unwrap(),
            Some(InternalEvent::text(Role::Assistant, "Done."))
        );
    }

    #[test]
    fn unknown_and_handshake_events_are_ignored() {
        let other = Frame::text(r#"{"type":"rate_limits.updated","rate_limits":[]}"#);
        assert_eq!(decode(&other, 24000).unwrap(), None);
        let created = Frame::text(r#"{"type":"session.created","event_id":"e1","session":{}}"#);
        assert_eq!(decode(&created, 24000).unwrap(), None);
    }

    #[test]
    fn user_text_creates_item_and_response() {
        let frames = encode(&InternalEvent::text(Role::User, "hi"), false).unwrap();
        assert_eq!(frames.len(), 2);
        let item = json(&frames[0]);
        assert_eq!(item["type"], "conversation.item.create");
        assert_eq!(item["item"]["role"], "user");
        assert_eq!(item["item"]["content"][0]["type"], "input_text");
        assert_eq!(item["item"]["content"][0]["text"], "hi");
        assert_eq!(json(&frames[1])["type"], "response.create");
    }

    #[test]
    fn audio_is_base64_unless_binary_is_configured() {
        let chunk = InternalEvent::audio(vec![1u8, 2, 3], 1, 24000);
        let frames = encode(&chunk, false).unwrap();
        let append = json(&frames[0]);
        assert_eq!(append["type"], "input_audio_buffer.append");
        assert_eq!(append["audio"], audio::encode(&[1, 2, 3]));

        assert_eq!(encode(&chunk, true).unwrap(), vec![Frame::binary(vec![1u8, 2, 3])]);
    }

    #[test]
    fn interrupt_cancels_the_response() {
        let frames = encode(&InternalEvent::control(ControlKind::Interrupt), false).unwrap();
        assert_eq!(json(&frames[0])["type"], "response.cancel");
    }

    #[test]
    fn session_update_carries_prompt_and_formats() {
        let update = json(&session_update(Some("Be brief.")).unwrap());
        assert_eq!(update["type"], "session.update");
        assert_eq!(update["session"]["instructions"], "Be brief.");
        assert_eq!(update["session"]["input_audio_format"], "pcm16");
        assert_eq!(update["session"]["turn_detection"]["type"], "server_vad");
    }
}
