//! Backend adapters.
//!
//! An adapter owns the connection to one backend and translates between
//! that backend's frames and [`InternalEvent`]s. The session pipeline only
//! ever talks to the [`Adapter`] trait, so backends are interchangeable.

pub mod lifecycle;
pub mod llm_direct;
pub mod retell;
pub mod voiceflow;

pub use lifecycle::{AdapterState, InvalidTransition, Lifecycle};
pub use llm_direct::LlmDirectAdapter;
pub use retell::{RetellAdapter, RetellListener};
pub use voiceflow::{VoiceflowAdapter, VoiceflowConnection};

use crate::config::AdapterConfig;
use crate::connection::{ConnectionHandle, Frame};
use crate::error::{ConnectCause, ConnectError, DecodeError, EncodeError};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use voice_relay_types::{BackendType, InternalEvent};

/// What to do with a frame received from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Hand the event to the session.
    Forward(InternalEvent),
    /// Answer the backend directly (keepalives); the client never sees it.
    Reply(Frame),
    Ignore,
}

impl From<Option<InternalEvent>> for Inbound {
    fn from(event: Option<InternalEvent>) -> Self {
        match event {
            Some(event) => Inbound::Forward(event),
            None => Inbound::Ignore,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Adapter: Send + Sync {
    fn backend(&self) -> BackendType;

    fn state(&self) -> AdapterState;

    /// Opens the backend connection and completes its handshake within the
    /// configured connect timeout. The returned handle stays owned by the
    /// adapter; [`Adapter::close`] releases it.
    async fn connect(&self) -> Result<Arc<dyn ConnectionHandle>, ConnectError>;

    /// Encodes an event for the backend. May produce zero or several frames.
    fn translate_outbound(&self, event: &InternalEvent) -> Result<Vec<Frame>, EncodeError>;

    fn translate_inbound(&self, frame: Frame) -> Result<Inbound, DecodeError>;

    /// Closes the backend connection. Idempotent.
    async fn close(&self);
}

/// Dispatches to the adapter selected by [`AdapterConfig::backend_type`].
pub enum BackendAdapter {
    LlmDirect(LlmDirectAdapter),
    Retell(RetellAdapter),
    VoiceFlow(VoiceflowAdapter),
}

impl BackendAdapter {
    /// `retell` is only used when the configuration selects Retell.
    pub fn new(config: Arc<AdapterConfig>, retell: &Arc<RetellListener>) -> Self {
        match config.backend_type {
            BackendType::LlmDirect => BackendAdapter::LlmDirect(LlmDirectAdapter::new(config)),
            BackendType::Retell => BackendAdapter::Retell(RetellAdapter::new(config, retell.clone())),
            BackendType::VoiceFlow => BackendAdapter::VoiceFlow(VoiceflowAdapter::new(config)),
        }
    }

    fn inner(&self) -> &dyn Adapter {
        match self {
            BackendAdapter::LlmDirect(adapter) => adapter,
            BackendAdapter::Retell(adapter) => adapter,
            BackendAdapter::VoiceFlow(adapter) => adapter,
        }
    }
}

#[async_trait]
impl Adapter for BackendAdapter {
    fn backend(&self) -> BackendType {
        self.inner().backend()
    }

    fn state(&self) -> AdapterState {
        self.inner().state()
    }

    async fn connect(&self) -> Result<Arc<dyn ConnectionHandle>, ConnectError> {
        self.inner().connect().await
    }

    fn translate_outbound(&self, event: &InternalEvent) -> Result<Vec<Frame>, EncodeError> {
        self.inner().translate_outbound(event)
    }

    fn translate_inbound(&self, frame: Frame) -> Result<Inbound, DecodeError> {
        self.inner().translate_inbound(frame)
    }

    async fn close(&self) {
        self.inner().close().await
    }
}

/// Creates one adapter per client connection.
pub trait AdapterFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Adapter>;
}

impl<F> AdapterFactory for F
where
    F: Fn() -> Arc<dyn Adapter> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Adapter> {
        self()
    }
}

/// Builds a [`BackendAdapter`] from the shared relay configuration.
pub struct ConfiguredAdapters {
    config: Arc<AdapterConfig>,
    retell: Arc<RetellListener>,
}

impl ConfiguredAdapters {
    pub fn new(config: Arc<AdapterConfig>) -> Self {
        let retell = Arc::new(RetellListener::new(config.retell_listen));
        Self { config, retell }
    }

    /// Opens the port Retell calls into when Retell is the configured
    /// backend, so calls can arrive before the first client does.
    pub async fn listen(&self) -> std::io::Result<Option<SocketAddr>> {
        match self.config.backend_type {
            BackendType::Retell => self.retell.bind().await.map(Some),
            _ => Ok(None),
        }
    }
}

impl AdapterFactory for ConfiguredAdapters {
    fn create(&self) -> Arc<dyn Adapter> {
        Arc::new(BackendAdapter::new(self.config.clone(), &self.retell))
    }
}

/// Runs a connect attempt under the connect timeout, driving `lifecycle`
/// to `Streaming` on success. On any failure the lifecycle is closed, which
/// also releases a connection attached during the attempt.
pub(crate) async fn connect_within<F>(
    lifecycle: &Lifecycle,
    backend: BackendType,
    timeout: Duration,
    attempt: F,
) -> Result<Arc<dyn ConnectionHandle>, ConnectError>
where
    F: Future<Output = Result<Arc<dyn ConnectionHandle>, ConnectError>>,
{
    lifecycle
        .transition(AdapterState::Connecting)
        .map_err(|e| ConnectError::new(backend, ConnectCause::Rejected(e.to_string())))?;

    let result = match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::timeout(backend)),
    };
    let result = result.and_then(|connection| {
        lifecycle
            .transition(AdapterState::Streaming)
            .map(|_| connection)
            .map_err(|e| ConnectError::new(backend, ConnectCause::Rejected(e.to_string())))
    });

    match result {
        Ok(connection) => {
            tracing::info!(backend = %backend, connection = connection.id(), "backend connected");
            Ok(connection)
        }
        Err(e) => {
            tracing::warn!(backend = %backend, "backend connect failed: {}", e);
            lifecycle.close().await;
            Err(e)
        }
    }
}

/// Classifies a websocket dial failure. 401 and 403 mean the credentials
/// were refused.
pub(crate) fn ws_connect_error(backend: BackendType, e: tokio_tungstenite::tungstenite::Error) -> ConnectError {
    use tokio_tungstenite::tungstenite::Error;
    let cause = match e {
        Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                ConnectCause::Authentication(format!("backend answered {}", status))
            } else {
                ConnectCause::Rejected(format!("backend answered {}", status))
            }
        }
        other => ConnectCause::Transport(other.to_string()),
    };
    ConnectError::new(backend, cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory;

    #[tokio::test]
    async fn connect_within_times_out_and_closes() {
        let lifecycle = Lifecycle::new(BackendType::LlmDirect);
        let err = connect_within(&lifecycle, BackendType::LlmDirect, Duration::from_millis(20), async {
            std::future::pending::<Result<Arc<dyn ConnectionHandle>, ConnectError>>().await
        })
        .await
        .err()
        .unwrap();

        assert_eq!(err, ConnectError::timeout(BackendType::LlmDirect));
        assert_eq!(lifecycle.state(), AdapterState::Closed);
    }

    #[tokio::test]
    async fn connect_within_streams_on_success() {
        let lifecycle = Lifecycle::new(BackendType::Retell);
        let (ours, _theirs) = memory::pair("backend", "peer", 1);
        let ours: Arc<dyn ConnectionHandle> = Arc::new(ours);

        let connection = connect_within(&lifecycle, BackendType::Retell, Duration::from_secs(1), async {
            Ok(ours.clone())
        })
        .await
        .unwrap();

        assert_eq!(connection.id(), "backend");
        assert_eq!(lifecycle.state(), AdapterState::Streaming);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let lifecycle = Lifecycle::new(BackendType::Retell);
        lifecycle.transition(AdapterState::Connecting).unwrap();
        let err = connect_within(&lifecycle, BackendType::Retell, Duration::from_secs(1), async {
            Err(ConnectError::timeout(BackendType::Retell))
        })
        .await
        .err()
        .unwrap();
        assert!(matches!(err.cause, ConnectCause::Rejected(_)));
    }

    #[test]
    fn closures_are_factories() {
        let config = Arc::new(AdapterConfig::new(BackendType::Retell, ""));
        let retell = Arc::new(RetellListener::new(config.retell_listen));
        let factory = move || -> Arc<dyn Adapter> { Arc::new(BackendAdapter::new(config.clone(), &retell)) };
        let adapter = factory.create();
        assert_eq!(adapter.backend(), BackendType::Retell);
        assert_eq!(adapter.state(), AdapterState::Disconnected);
    }

    #[tokio::test]
    async fn only_retell_opens_a_listen_port() {
        let llm = ConfiguredAdapters::new(Arc::new(AdapterConfig::new(BackendType::LlmDirect, "sk-test")));
        assert_eq!(llm.listen().await.unwrap(), None);

        let retell = ConfiguredAdapters::new(Arc::new(
            AdapterConfig::new(BackendType::Retell, "").with_retell_listen("127.0.0.1:0".parse().unwrap()),
        ));
        let addr = retell.listen().await.unwrap().unwrap();
        assert_ne!(addr.port(), 0);
        // Binding again reuses the open port.
        assert_eq!(retell.listen().await.unwrap(), Some(addr));
    }
}
