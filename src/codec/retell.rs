use crate::codec::{from_json, to_json};
use crate::connection::Frame;
use crate::error::{DecodeError, EncodeError};
use std::time::{SystemTime, UNIX_EPOCH};
use voice_relay_types::retell::{RetellRequest, RetellResponse};
use voice_relay_types::{ControlKind, InternalEvent, Protocol, Role};

const PROTOCOL: Protocol = Protocol::Retell;

pub fn decode(frame: &Frame, sample_rate: u32) -> Result<Option<InternalEvent>, DecodeError> {
    match frame {
        Frame::Binary(data) => Ok(Some(InternalEvent::audio(data.clone(), 0, sample_rate))),
        Frame::Text(text) => Ok(request_event(&parse(text)?)),
    }
}

pub fn parse(text: &str) -> Result<RetellRequest, DecodeError> {
    from_json(text, PROTOCOL)
}

/// What a Retell request means for the conversation. Keepalives and call
/// metadata carry nothing.
pub fn request_event(request: &RetellRequest) -> Option<InternalEvent> {
    match request {
        RetellRequest::ResponseRequired { transcript, .. } | RetellRequest::ReminderRequired { transcript, .. } => {
            let last = transcript.last()?;
            let content = last.content().trim();
            if content.is_empty() {
                return None;
            }
            let role = if last.is_agent() { Role::Assistant } else { Role::User };
            Some(InternalEvent::text(role, content))
        }
        RetellRequest::UpdateOnly { turntaking, .. } if turntaking.as_deref() == Some("user_turn") => {
            Some(InternalEvent::control(ControlKind::Interrupt))
        }
        RetellRequest::UpdateOnly { .. }
        | RetellRequest::PingPong { .. }
        | RetellRequest::CallDetails { .. }
        | RetellRequest::Other => None,
    }
}

/// Encodes toward Retell. Text answers the pending `response_id` when there
/// is one and is pushed as an agent interrupt otherwise.
pub fn encode(event: &InternalEvent, pending_response: Option<i64>) -> Result<Vec<Frame>, EncodeError> {
    let response = match event {
        InternalEvent::AudioChunk(chunk) => return Ok(vec![Frame::Binary(chunk.data.clone())]),
        InternalEvent::TextMessage(message) => match pending_response {
            Some(response_id) => RetellResponse::Response {
                response_id,
                content: message.content.clone(),
                content_complete: true,
                end_call: wants_end_call(&message.content).then_some(true),
            },
            None => RetellResponse::AgentInterrupt {
                interrupt_id: now_millis(),
                content: message.content.clone(),
                content_complete: true,
                no_interruption_allowed: true,
            },
        },
        InternalEvent::ControlSignal(signal) => match (&signal.kind, pending_response) {
            (ControlKind::SessionEnd, Some(response_id)) => RetellResponse::Response {
                response_id,
                content: signal.payload.clone().unwrap_or_default(),
                content_complete: true,
                end_call: Some(true),
            },
            (ControlKind::Error(_), _) => {
                return Err(EncodeError::Unsupported {
                    event: "error",
                    protocol: PROTOCOL,
                })
            }
            _ => return Ok(Vec::new()),
        },
    };
    Ok(vec![to_json(&response, PROTOCOL)?])
}

pub fn ping_pong(timestamp: i64) -> Result<Frame, EncodeError> {
    to_json(&RetellResponse::PingPong { timestamp }, PROTOCOL)
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn wants_end_call(content: &str) -> bool {
    let content = content.to_lowercase();
    content.contains("end call") || content.contains("goodbye")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(frames: &[Frame]) -> serde_json::Value {
        match frames {
            [Frame::Text(text)] => serde_json::from_str(text).unwrap(),
            other => panic!("expected one text frame, got {:?}", other),
        }
    }

    #[test]
    fn response_required_forwards_last_utterance() {
        let frame = Frame::text(
            r#"{"interaction_type":"response_required","response_id":3,"transcript":[{"role":"agent","content":"Hello"},{"role":"user","content":"What time is it?"}]}"#,
        );
        assert_eq!(
            decode(&frame, 16000).unwrap(),
            Some(InternalEvent::text(Role::User, "What time is it?"))
        );
    }

    #[test]
    fn user_turn_update_is_an_interrupt() {
        let frame = Frame::text(r#"{"interaction_type":"update_only","transcript":[],"turntaking":"user_turn"}"#);
        assert!(decode(&frame, 16000).unwrap().unwrap().is_interrupt());

        let plain = Frame::text(r#"{"interaction_type":"update_only","transcript":[]}"#);
        assert_eq!(decode(&plain, 16000).unwrap(), None);
    }

    #[test]
    fn ping_and_call_details_carry_nothing() {
        let ping = Frame::text(r#"{"interaction_type":"ping_pong","timestamp":1700000000000}"#);
        assert_eq!(decode(&ping, 16000).unwrap(), None);
        let details = Frame::text(r#"{"interaction_type":"call_details","call":{"call_id":"c1"}}"#);
        assert_eq!(decode(&details, 16000).unwrap(), None);
    }

    #[test]
    fn text_answers_pending_response() {
        let frames = encode(&InternalEvent::text(Role::Assistant, "Sure, one moment."), Some(9)).unwrap();
        let response = json(&frames);
        assert_eq!(response["response_type"], "response");
        assert_eq!(response["response_id"], 9);
        assert_eq!(response["content_complete"], true);
        assert!(response.get("end_call").is_none());
    }

    #[test]
    fn goodbye_ends_the_call() {
        let frames = encode(&InternalEvent::text(Role::Assistant, "Thanks, Goodbye!"), Some(1)).unwrap();
        assert_eq!(json(&frames)["end_call"], true);
    }

    #[test]
    fn unsolicited_text_is_an_agent_interrupt() {
        let frames = encode(&InternalEvent::text(Role::Assistant, "Are you still there?"), None).unwrap();
        let response = json(&frames);
        assert_eq!(response["response_type"], "agent_interrupt");
        assert_eq!(response["content"], "Are you still there?");
        assert!(response["interrupt_id"].as_i64().unwrap() > 0);
        assert_eq!(response["no_interruption_allowed"], true);
        assert_eq!(response["content_complete"], true);
    }
}
