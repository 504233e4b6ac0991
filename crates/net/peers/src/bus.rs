//! Bounded single-consumer event bus with a non-blocking publish side.
//!
//! Routing-table callbacks run inside the routing subsystem and must never wait on
//! the consumer, so [`EventSink::publish`] is synchronous and applies an
//! [`OverflowPolicy`] when the queue is full. Every dropped event is counted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// What to drop when a publish finds the queue full.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Keep the queue as is and drop the event being published.
    #[default]
    DropNewest,
    /// Evict the oldest queued event to make room.
    DropOldest,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Queued,
    DroppedIncoming,
    DroppedOldest,
}

#[derive(Debug)]
struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    senders: AtomicUsize,
    dropped: AtomicU64,
}

impl<T> Shared<T> {
    fn record_drop(&self) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!("overlay.events.dropped_total").increment(1);
        // First drop, then every thousandth.
        if total == 1 || total % 1000 == 0 {
            warn!(dropped = total, policy = %self.policy, "event bus full, dropping events");
        }
    }
}

/// Create a bus holding at most `capacity` pending events (minimum 1).
pub fn event_bus<T>(capacity: usize, policy: OverflowPolicy) -> (EventSink<T>, EventReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        policy,
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        dropped: AtomicU64::new(0),
    });
    (
        EventSink {
            shared: shared.clone(),
        },
        EventReceiver { shared },
    )
}

/// Producer handle. Cloneable and usable from synchronous code.
#[derive(Debug)]
pub struct EventSink<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for EventSink<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.notify.notify_one();
        }
    }
}

impl<T> EventSink<T> {
    /// Enqueue `event` without waiting.
    pub fn publish(&self, event: T) -> Publish {
        let outcome = {
            let mut queue = self.shared.queue.lock();
            if queue.len() < self.shared.capacity {
                queue.push_back(event);
                Publish::Queued
            } else {
                match self.shared.policy {
                    OverflowPolicy::DropNewest => Publish::DroppedIncoming,
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(event);
                        Publish::DroppedOldest
                    }
                }
            }
        };

        if outcome != Publish::DroppedIncoming {
            self.shared.notify.notify_one();
        }
        if outcome != Publish::Queued {
            self.shared.record_drop();
        }
        outcome
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// The single consumer side.
#[derive(Debug)]
pub struct EventReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> EventReceiver<T> {
    /// Next event in publish order. `None` once every sink is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(event) = self.shared.queue.lock().pop_front() {
                return Some(event);
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.shared.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
