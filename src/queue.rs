//! Bounded FIFO between a session's read loops and writers.
//!
//! `push` waits while the queue is full, which is how a slow consumer slows
//! its producer down. Nothing is ever dropped silently: the only removals
//! other than `pop` are explicit [`EventQueue::discard_where`] calls.

use crate::error::SessionError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use voice_relay_types::InternalEvent;

pub struct EventQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> EventQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item, waiting for room. Fails once the queue is closed.
    pub async fn push(&self, item: T) -> Result<(), SessionError> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(SessionError::Closed);
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Takes the oldest item, waiting for one. Returns `None` once the queue
    /// is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Removes every queued item matching `pred`, keeping the order of the
    /// rest. Returns how many were removed.
    pub fn discard_where(&self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let removed = {
            let mut inner = self.lock();
            let before = inner.items.len();
            inner.items.retain(|item| !pred(item));
            before - inner.items.len()
        };
        if removed > 0 {
            self.not_full.notify_waiters();
        }
        removed
    }

    /// Wakes every waiter. Pushes fail from now on; pops drain what is left.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventQueue<InternalEvent> {
    /// Drops pending output made stale by a barge-in. A queued session end
    /// is kept so the session still terminates.
    pub fn discard_for_interrupt(&self) -> usize {
        self.discard_where(|event| !event.is_session_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use voice_relay_types::{ControlKind, Role};

    #[tokio::test]
    async fn pops_in_push_order() {
        let queue = EventQueue::new(4);
        for i in 0..4 {
            queue.push(i).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(queue.pop().await, Some(i));
        }
    }

    #[tokio::test]
    async fn push_waits_for_room() {
        // --- Arrange ---
        let queue = Arc::new(EventQueue::new(1));
        queue.push(1).await.unwrap();

        // --- Act ---
        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.pop().await, Some(1));

        // --- Assert ---
        producer.await.unwrap().unwrap();
        assert_eq!(queue.pop().await, Some(2));
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let queue = Arc::new(EventQueue::<u32>::new(2));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
        assert_eq!(queue.push(1).await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn close_wakes_waiting_producer() {
        let queue = Arc::new(EventQueue::new(1));
        queue.push(0u32).await.unwrap();
        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        assert_eq!(producer.await.unwrap(), Err(SessionError::Closed));
        // Items queued before the close are still delivered.
        assert_eq!(queue.pop().await, Some(0));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn interrupt_discard_keeps_session_end() {
        let queue = EventQueue::new(8);
        queue.push(InternalEvent::audio(vec![1u8], 1, 16000)).await.unwrap();
        queue.push(InternalEvent::text(Role::Assistant, "stale")).await.unwrap();
        queue.push(InternalEvent::control(ControlKind::SessionEnd)).await.unwrap();
        queue.push(InternalEvent::audio(vec![2u8], 2, 16000)).await.unwrap();

        assert_eq!(queue.discard_for_interrupt(), 3);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop().await.unwrap().is_session_end());
    }
}
