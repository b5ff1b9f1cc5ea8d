use crate::connection::ConnectionHandle;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voice_relay_types::BackendType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Disconnected,
    Connecting,
    Handshaking,
    Streaming,
    Closing,
    Closed,
}

impl AdapterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterState::Disconnected => "disconnected",
            AdapterState::Connecting => "connecting",
            AdapterState::Handshaking => "handshaking",
            AdapterState::Streaming => "streaming",
            AdapterState::Closing => "closing",
            AdapterState::Closed => "closed",
        }
    }

    /// Forward-only: a failed connect may jump straight to `Closed`, and
    /// nothing leaves `Closed`.
    pub fn can_transition(self, to: AdapterState) -> bool {
        use AdapterState::*;
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Handshaking)
                | (Connecting, Streaming)
                | (Handshaking, Streaming)
                | (Disconnected | Connecting | Handshaking | Streaming, Closing)
                | (Disconnected | Connecting | Handshaking | Closing, Closed)
        )
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid adapter transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: AdapterState,
    pub to: AdapterState,
}

/// State shared by every adapter: where it is in its lifecycle and the
/// backend connection it owns.
pub struct Lifecycle {
    backend: BackendType,
    state: Mutex<AdapterState>,
    connection: Mutex<Option<Arc<dyn ConnectionHandle>>>,
    closed: AtomicBool,
}

impl Lifecycle {
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            state: Mutex::new(AdapterState::Disconnected),
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AdapterState {
        *self.lock_state()
    }

    pub fn transition(&self, to: AdapterState) -> Result<(), InvalidTransition> {
        let mut state = self.lock_state();
        if !state.can_transition(to) {
            return Err(InvalidTransition { from: *state, to });
        }
        tracing::debug!(backend = %self.backend, from = %*state, to = %to, "adapter state change");
        *state = to;
        Ok(())
    }

    /// Remembers the backend connection so that [`Lifecycle::close`] can
    /// release it.
    pub fn attach(&self, connection: Arc<dyn ConnectionHandle>) {
        *self.connection.lock().unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    pub fn connection(&self) -> Option<Arc<dyn ConnectionHandle>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Closes the attached connection. Only the first call does anything;
    /// it returns whether it was that call.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        {
            let mut state = self.lock_state();
            if state.can_transition(AdapterState::Closing) {
                *state = AdapterState::Closing;
            }
        }
        let connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(connection) = connection {
            connection.close().await;
        }
        *self.lock_state() = AdapterState::Closed;
        tracing::debug!(backend = %self.backend, "adapter closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
