//! Event model and wire types shared by the relay.
//!
//! [`InternalEvent`] is the protocol-agnostic unit every protocol is decoded
//! into; the protocol modules hold the serde shapes of each socket.

pub mod backend;
pub mod client;
pub mod event;
pub mod realtime;
pub mod retell;
pub mod voiceflow;

pub use backend::{BackendType, Protocol};
pub use event::{AudioChunk, ControlKind, ControlSignal, ErrorCause, InternalEvent, Role, TextMessage};
