//! In-process connection pairs.
//!
//! Both ends share one link: closing either end closes the pair, like a
//! socket. Frames already in flight stay readable by the other end.

use crate::connection::{ConnectionHandle, Frame};
use crate::error::SessionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct MemoryConnection {
    id: String,
    tx: mpsc::Sender<Frame>,
    rx: Mutex<mpsc::Receiver<Frame>>,
    link: CancellationToken,
    close_calls: AtomicUsize,
}

/// Creates two connected ends, each buffering up to `capacity` frames.
pub fn pair(a: &str, b: &str, capacity: usize) -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    let link = CancellationToken::new();
    let end = |id: &str, tx, rx| MemoryConnection {
        id: id.to_string(),
        tx,
        rx: Mutex::new(rx),
        link: link.clone(),
        close_calls: AtomicUsize::new(0),
    };
    (end(a, a_tx, a_rx), end(b, b_tx, b_rx))
}

impl MemoryConnection {
    /// How many times `close()` was invoked on this end.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Resolves once either end closed the link.
    pub async fn closed(&self) {
        self.link.cancelled().await
    }
}

#[async_trait]
impl ConnectionHandle for MemoryConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, frame: Frame) -> Result<(), SessionError> {
        if self.link.is_cancelled() {
            return Err(SessionError::Closed);
        }
        tokio::select! {
            _ = self.link.cancelled() => Err(SessionError::Closed),
            sent = self.tx.send(frame) => sent.map_err(|_| SessionError::Closed),
        }
    }

    async fn receive(&self) -> Option<Result<Frame, SessionError>> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            frame = rx.recv() => frame.map(Ok),
            _ = self.link.cancelled() => None,
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.link.cancel();
    }

    fn is_closed(&self) -> bool {
        self.link.is_cancelled()
    }
}
