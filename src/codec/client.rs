use crate::codec::{from_json, to_json};
use crate::connection::Frame;
use crate::error::{DecodeError, EncodeError};
use voice_relay_types::client::{ClientControl, ClientText, CONVERSATION_ENDED};
use voice_relay_types::{ControlKind, ErrorCause, InternalEvent, Protocol};
use voice_relay_utils::audio;

const PROTOCOL: Protocol = Protocol::Client;

pub fn decode(frame: &Frame, sample_rate: u32) -> Result<Option<InternalEvent>, DecodeError> {
    let text = match frame {
        Frame::Binary(data) => return Ok(Some(InternalEvent::audio(data.clone(), 0, sample_rate))),
        Frame::Text(text) => text,
    };

    let value: serde_json::Value = from_json(text, PROTOCOL)?;
    if value.get("type").is_none() {
        let message: ClientText = serde_json::from_value(value)
            .map_err(|e| DecodeError::new(PROTOCOL, e.to_string(), text.as_bytes()))?;
        let content = message.content().trim();
        if content.is_empty() {
            return Ok(None);
        }
        return Ok(Some(InternalEvent::text(message.role(), content)));
    }

    let control: ClientControl = serde_json::from_value(value)
        .map_err(|e| DecodeError::new(PROTOCOL, e.to_string(), text.as_bytes()))?;
    let event = match control {
        ClientControl::Audio {
            audio: payload,
            seq,
            sample_rate: rate,
        } => {
            let data = audio::decode(&payload)
                .map_err(|e| DecodeError::new(PROTOCOL, format!("invalid base64 audio: {}", e), text.as_bytes()))?;
            InternalEvent::audio(data, seq.unwrap_or(0), rate.unwrap_or(sample_rate))
        }
        ClientControl::Start { content } => with_payload(ControlKind::SessionStart, content),
        ClientControl::End { content } => with_payload(ControlKind::SessionEnd, content),
        ClientControl::Interrupt => InternalEvent::control(ControlKind::Interrupt),
        ClientControl::TurnEnd => InternalEvent::control(ControlKind::TurnEnd),
        ClientControl::Error { cause, content } => {
            with_payload(ControlKind::Error(cause.unwrap_or(ErrorCause::Transport)), content)
        }
    };
    Ok(Some(event))
}

fn with_payload(kind: ControlKind, payload: Option<String>) -> InternalEvent {
    match payload {
        Some(payload) => InternalEvent::control_with(kind, payload),
        None => InternalEvent::control(kind),
    }
}

pub fn encode(event: &InternalEvent) -> Result<Vec<Frame>, EncodeError> {
    let frame = match event {
        InternalEvent::AudioChunk(chunk) => Frame::Binary(chunk.data.clone()),
        InternalEvent::TextMessage(message) => to_json(&ClientText::new(message.role, &message.content), PROTOCOL)?,
        InternalEvent::ControlSignal(signal) => {
            let payload = signal.payload.clone();
            let control = match signal.kind {
                ControlKind::SessionStart => ClientControl::Start { content: payload },
                ControlKind::SessionEnd => ClientControl::End {
                    content: Some(payload.unwrap_or_else(|| CONVERSATION_ENDED.to_string())),
                },
                ControlKind::Interrupt => ClientControl::Interrupt,
                ControlKind::TurnEnd => ClientControl::TurnEnd,
                ControlKind::Error(cause) => ClientControl::Error {
                    cause: Some(cause),
                    content: payload,
                },
            };
            to_json(&control, PROTOCOL)?
        }
    };
    Ok(vec![frame])
}
