//! A relay between voice/text clients and conversational AI backends.
//!
//! Each client websocket becomes a [`Session`] bridged to one backend
//! through an [`Adapter`]. Frames are decoded into
//! [`InternalEvent`](types::InternalEvent)s on the way in and encoded for
//! the other side on the way out.

pub mod adapter;
pub mod codec;
pub mod config;
pub mod connection;
pub mod consts;
pub mod error;
pub mod manager;
pub mod queue;
pub mod sequence;
pub mod server;
pub mod session;

pub use voice_relay_types as types;
pub use voice_relay_utils as utils;

pub use adapter::{Adapter, AdapterFactory, AdapterState, BackendAdapter, Inbound};
pub use codec::FrameCodec;
pub use config::{AdapterConfig, RelayConfig};
pub use connection::{ConnectionHandle, Frame};
pub use error::{ConnectCause, ConnectError, DecodeError, EncodeError, SessionError};
pub use manager::SessionManager;
pub use session::{Session, SessionExit, SessionState};
