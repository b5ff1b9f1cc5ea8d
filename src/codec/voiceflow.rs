use crate::codec::{from_json, to_json};
use crate::connection::Frame;
use crate::error::{DecodeError, EncodeError};
use voice_relay_types::voiceflow::{InteractRequest, SpeakPayload, Trace};
use voice_relay_types::{ControlKind, InternalEvent, Protocol, Role};
use voice_relay_utils::audio;

const PROTOCOL: Protocol = Protocol::VoiceFlow;

/// Decodes one trace. The HTTP connection splits every interact response
/// into one text frame per trace.
pub fn decode(frame: &Frame, sample_rate: u32) -> Result<Option<InternalEvent>, DecodeError> {
    match frame {
        Frame::Binary(data) => Err(DecodeError::new(PROTOCOL, "unexpected binary frame", data)),
        Frame::Text(text) => Ok(trace_event(&from_json(text, PROTOCOL)?, sample_rate)),
    }
}

/// Speak traces with an inline data URL are forwarded as audio, everything
/// else with a message as assistant text.
pub fn trace_event(trace: &Trace, sample_rate: u32) -> Option<InternalEvent> {
    if let Trace::Speak { payload } = trace {
        if let Some(data) = payload.src.as_deref().and_then(audio::decode_data_url) {
            return Some(InternalEvent::audio(data, 0, sample_rate));
        }
    }
    match trace {
        Trace::End => Some(InternalEvent::control(ControlKind::SessionEnd)),
        _ => trace.message().map(|message| InternalEvent::text(Role::Assistant, message)),
    }
}

/// Folds the traces of one interact answer into what the client hears.
///
/// Audio from `speak` traces comes first, in order. Every message is then
/// joined with a space into a single text trace, so an answer split over
/// several speak and text traces reads as one reply. An `end` trace goes
/// last; anything else is dropped.
pub fn coalesce(traces: Vec<Trace>) -> Vec<Trace> {
    let mut out = Vec::with_capacity(traces.len());
    let mut messages = Vec::new();
    let mut ended = false;
    for trace in traces {
        if let Some(message) = trace.message() {
            messages.push(message.to_string());
        }
        match trace {
            Trace::Speak { payload } => {
                if let Some(src) = payload.src {
                    out.push(Trace::Speak {
                        payload: SpeakPayload {
                            message: None,
                            src: Some(src),
                        },
                    });
                }
            }
            Trace::End => ended = true,
            Trace::Text { .. } | Trace::Other => {}
        }
    }
    if !messages.is_empty() {
        out.push(Trace::text(&messages.join(" ")));
    }
    if ended {
        out.push(Trace::End);
    }
    out
}

pub fn encode(event: &InternalEvent) -> Result<Vec<Frame>, EncodeError> {
    let request = match event {
        InternalEvent::AudioChunk(chunk) => {
            InteractRequest::audio(audio::encode(&chunk.data), chunk.sequence, chunk.sample_rate)
        }
        InternalEvent::TextMessage(message) => {
            let text = message.content.trim();
            if text.is_empty() {
                return Ok(Vec::new());
            }
            InteractRequest::text(text)
        }
        InternalEvent::ControlSignal(signal) => match signal.kind {
            ControlKind::Error(_) => {
                return Err(EncodeError::Unsupported {
                    event: "error",
                    protocol: PROTOCOL,
                })
            }
            _ => return Ok(Vec::new()),
        },
    };
    Ok(vec![to_json(&request, PROTOCOL)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_trace_is_assistant_text() {
        let frame = Frame::text(r#"{"type":"speak","payload":{"message":"How can I help?"}}"#);
        assert_eq!(
            decode(&frame, 16000).unwrap(),
            Some(InternalEvent::text(Role::Assistant, "How can I help?"))
        );
    }

    #[test]
    fn speak_trace_with_audio_source_is_audio() {
        let src = audio::encode_data_url("audio/wav", &[4, 5, 6]);
        let frame = Frame::text(format!(
            r#"{{"type":"speak","payload":{{"message":"hi","src":"{}"}}}}"#,
            src
        ));
        assert_eq!(
            decode(&frame, 16000).unwrap(),
            Some(InternalEvent::audio(vec![4u8, 5, 6], 0, 16000))
        );
    }

    #[test]
    fn end_trace_ends_the_session() {
        let event = decode(&Frame::text(r#"{"type":"end"}"#), 16000).unwrap().unwrap();
        assert!(event.is_session_end());
    }

    #[test]
    fn visual_traces_are_ignored() {
        let frame = Frame::text(r#"{"type":"visual","payload":{"image":"cat.png"}}"#);
        assert_eq!(decode(&frame, 16000).unwrap(), None);
    }

    #[test]
    fn answer_messages_are_joined_and_audio_kept() {
        // --- Arrange ---
        let src = audio::encode_data_url("audio/wav", &[1, 2]);
        let traces = vec![
            Trace::Speak {
                payload: SpeakPayload {
                    message: Some("Your order".to_string()),
                    src: Some(src.clone()),
                },
            },
            Trace::Other,
            Trace::text("shipped yesterday."),
            Trace::End,
        ];

        // --- Act ---
        let coalesced = coalesce(traces);

        // --- Assert ---
        assert_eq!(coalesced.len(), 3);
        assert_eq!(
            trace_event(&coalesced[0], 16000),
            Some(InternalEvent::audio(vec![1u8, 2], 0, 16000))
        );
        assert_eq!(coalesced[1].message(), Some("Your order shipped yesterday."));
        assert_eq!(coalesced[2], Trace::End);
    }

    #[test]
    fn answer_without_messages_has_no_text() {
        assert_eq!(coalesce(vec![Trace::Other, Trace::End]), vec![Trace::End]);
        assert!(coalesce(Vec::new()).is_empty());
    }

    #[test]
    fn text_becomes_a_text_action() {
        let frames = encode(&InternalEvent::text(Role::User, " order status ")).unwrap();
        assert_eq!(
            frames,
            vec![Frame::text(r#"{"action":{"type":"text","payload":"order status"}}"#)]
        );
        assert!(encode(&InternalEvent::text(Role::User, "   ")).unwrap().is_empty());
    }

    #[test]
    fn audio_becomes_an_audio_action() {
        let frames = encode(&InternalEvent::audio(vec![1u8, 2], 7, 16000)).unwrap();
        let json: serde_json::Value = match &frames[0] {
            Frame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        };
        assert_eq!(json["action"]["type"], "audio");
        assert_eq!(json["action"]["payload"]["sequence"], 7);
        assert_eq!(json["action"]["payload"]["sampleRate"], 16000);
    }
}
