//! Accepts client connections and keeps the registry of live sessions.

use crate::adapter::{AdapterFactory, ConfiguredAdapters};
use crate::codec::FrameCodec;
use crate::config::RelayConfig;
use crate::connection::ConnectionHandle;
use crate::error::{ConnectCause, ConnectError};
use crate::session::{Session, SessionExit, SessionId, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use voice_relay_types::{BackendType, InternalEvent, Protocol};

pub struct SessionEntry {
    session: Arc<Session>,
}

impl SessionEntry {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

/// A point-in-time view of one registered session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub backend: BackendType,
    pub state: SessionState,
    pub created_at: SystemTime,
}

#[derive(Clone)]
pub struct SessionManager {
    config: Arc<RelayConfig>,
    factory: Arc<dyn AdapterFactory>,
    sessions: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl SessionManager {
    /// Sessions get the backend adapter selected by the configuration.
    pub fn new(config: Arc<RelayConfig>) -> Self {
        let factory = Arc::new(ConfiguredAdapters::new(config.adapter.clone()));
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: Arc<RelayConfig>, factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            config,
            factory,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bridges `client` to a new backend session and returns once the
    /// session has closed.
    ///
    /// When the backend cannot be connected the client receives one error
    /// event and is closed; nothing is registered.
    pub async fn on_client_connect(&self, client: Arc<dyn ConnectionHandle>) -> Result<SessionExit, ConnectError> {
        let adapter = self.factory.create();
        let backend = adapter.backend();
        let session = Arc::new(Session::new(client.clone(), adapter, &self.config));
        let id = session.id().to_string();

        if self.registry().contains_key(&id) {
            let err = duplicate(backend, &id);
            self.reject(&session, client.as_ref(), &err).await;
            return Err(err);
        }

        tracing::info!(session = %id, backend = %backend, "client connected");
        if let Err(err) = session.connect().await {
            self.reject(&session, client.as_ref(), &err).await;
            return Err(err);
        }

        let registered = {
            let mut sessions = self.registry();
            if sessions.contains_key(&id) {
                false
            } else {
                sessions.insert(
                    id.clone(),
                    SessionEntry {
                        session: session.clone(),
                    },
                );
                true
            }
        };
        if !registered {
            let err = duplicate(backend, &id);
            self.reject(&session, client.as_ref(), &err).await;
            return Err(err);
        }

        let exit = session.run().await;
        self.deregister(&id);
        Ok(exit)
    }

    /// Sends the connect failure to the client and closes everything the
    /// session holds.
    async fn reject(&self, session: &Session, client: &dyn ConnectionHandle, err: &ConnectError) {
        tracing::warn!(session = %session.id(), "rejecting client: {}", err);
        let event = InternalEvent::error(err.cause.error_cause(), err.to_string());
        match FrameCodec::from_config(&self.config.adapter).encode(&event, Protocol::Client) {
            Ok(frames) => {
                for frame in frames {
                    if let Err(e) = client.send(frame).await {
                        tracing::debug!(session = %session.id(), "could not send error to client: {}", e);
                        break;
                    }
                }
            }
            Err(e) => tracing::warn!(session = %session.id(), "failed to encode error for client: {}", e),
        }
        session.close().await;
    }

    fn deregister(&self, id: &str) {
        match self.registry().remove(id) {
            Some(_) => tracing::debug!(session = %id, "session deregistered"),
            None => tracing::warn!(session = %id, "session was not registered"),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.registry().get(id).map(|entry| entry.session.clone())
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.registry()
            .values()
            .map(|entry| SessionInfo {
                id: entry.session.id().to_string(),
                backend: entry.session.backend(),
                state: entry.session.state(),
                created_at: entry.session.created_at(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every live session and waits for them to finish closing.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.registry().values().map(|entry| entry.session.clone()).collect();
        if sessions.is_empty() {
            return;
        }
        tracing::info!(sessions = sessions.len(), "closing all sessions");
        futures::future::join_all(sessions.iter().map(|session| session.close())).await;
    }
}

fn duplicate(backend: BackendType, id: &str) -> ConnectError {
    ConnectError::new(backend, ConnectCause::Rejected(format!("session {} already exists", id)))
}
