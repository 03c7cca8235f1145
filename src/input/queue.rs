//! Bounded drop-oldest event queue
//!
//! The capture callback must never block, so a full queue evicts its oldest
//! entry instead of rejecting the new one. Freshness wins over completeness.
//! The single consumer waits on a [`Notify`] permit, so an empty queue costs
//! nothing and a push racing the wait is never lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::InputEvent;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// An event stamped with the instant it entered the queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedEvent {
    pub event: InputEvent,
    pub enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Accepted after evicting the oldest queued event
    DroppedOldest,
}

#[derive(Debug)]
pub struct EventQueue {
    entries: Mutex<VecDeque<QueuedEvent>>,
    capacity: usize,
    ready: Notify,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Created event queue with capacity {}", capacity);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking push, safe from any thread
    pub fn enqueue(&self, event: InputEvent) -> EnqueueOutcome {
        self.enqueue_at(event, Instant::now())
    }

    pub fn enqueue_at(&self, event: InputEvent, at: Instant) -> EnqueueOutcome {
        let outcome = {
            let mut entries = self.entries.lock();
            let outcome = if entries.len() >= self.capacity {
                entries.pop_front();
                EnqueueOutcome::DroppedOldest
            } else {
                EnqueueOutcome::Accepted
            };
            entries.push_back(QueuedEvent {
                event,
                enqueued_at: at,
            });
            outcome
        };

        self.accepted.fetch_add(1, Ordering::Relaxed);
        if outcome == EnqueueOutcome::DroppedOldest {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // One warning per burst keeps a flooded queue from flooding the log too
            if dropped == 1 || dropped % 256 == 0 {
                warn!(
                    "Input queue full ({} entries), dropped oldest event ({} dropped so far)",
                    self.capacity, dropped
                );
            } else {
                debug!("Input queue overflow, dropped oldest event");
            }
        }

        self.ready.notify_one();
        outcome
    }

    /// Pops the oldest event
    pub fn pop(&self) -> Option<QueuedEvent> {
        self.entries.lock().pop_front()
    }

    /// Moves every queued event into `buffer` in FIFO order, returns the count
    pub fn drain_into(&self, buffer: &mut Vec<QueuedEvent>) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        buffer.extend(entries.drain(..));
        count
    }

    /// Resolves once an event has been pushed since the last wake-up
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
