//! Bounded per-connection send queue.
//!
//! Fan-out must never block on a slow consumer: `push` is synchronous and,
//! when the queue is full, evicts the **oldest** unsent event and counts the
//! drop. This is the right trade-off for cursor/edit telemetry — stale
//! presence updates are superseded by newer ones — and deliberately not a
//! reliable-messaging queue.
//!
//! Delivery order is FIFO, which (together with the router processing each
//! sender's events sequentially) gives per-sender, per-recipient ordering.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

use crate::protocol::ServerEvent;

/// Outbound event queue for one connection.
pub struct SendQueue {
    inner: Mutex<VecDeque<ServerEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SendQueue {
    /// Create a queue holding at most `capacity` unsent events.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "send queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue an event. Never blocks.
    ///
    /// When the queue is full the oldest unsent event is evicted to make
    /// room. Returns `true` if an eviction happened. Pushing to a closed
    /// queue is a no-op.
    pub fn push(&self, event: ServerEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let evicted = {
            let mut queue = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(event);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<ServerEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
                // Checked under the lock so a push racing with close is
                // still drained before we report the end of the stream.
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue. Wakes a pending `pop`; already-queued events are
    /// still drained before `pop` yields `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Number of unsent events.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total events evicted by the drop-oldest policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
