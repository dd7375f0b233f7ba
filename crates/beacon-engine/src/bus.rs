//! Broadcast bus for change events.
//!
//! Each subscriber owns an independent bounded queue; `publish` copies the
//! event into every queue and returns immediately. A slow or stuck
//! subscriber only ever loses its own events — it can neither block the
//! publisher nor affect other subscribers. Per-subscriber FIFO order is
//! preserved; no ordering is guaranteed across subscribers.

use beacon_types::ChangeEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::Notify;
use uuid::Uuid;

/// What to do when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to make room for the new one. The
    /// default: a live viewer cares about the latest status more than
    /// historical intermediate events.
    #[default]
    DropOldest,
    /// Discard the incoming event and keep the queue as is.
    DropNewest,
}

/// Default per-subscriber queue capacity.
const DEFAULT_CAPACITY: usize = 64;

struct SubscriberQueue {
    /// Brief synchronous lock; never held across an `.await` point.
    events: StdMutex<VecDeque<ChangeEvent>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: StdMutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: &ChangeEvent, capacity: usize, policy: OverflowPolicy) {
        {
            let mut events = self.events.lock().expect("subscriber queue poisoned");
            if events.len() >= capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match policy {
                    OverflowPolicy::DropOldest => {
                        events.pop_front();
                    }
                    OverflowPolicy::DropNewest => {
                        return;
                    }
                }
            }
            events.push_back(event.clone());
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Fan-out bus for [`ChangeEvent`]s.
///
/// Cloning is cheap; all clones share the same subscriber registry.
#[derive(Clone)]
pub struct StatusBus {
    subscribers: Arc<StdRwLock<HashMap<Uuid, Arc<SubscriberQueue>>>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, OverflowPolicy::default())
    }
}

impl StatusBus {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            subscribers: Arc::new(StdRwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Registers a new subscriber and returns its handle.
    ///
    /// The subscription unregisters itself when dropped.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let queue = Arc::new(SubscriberQueue::new(self.capacity));
        self.subscribers
            .write()
            .expect("subscriber registry poisoned")
            .insert(id, Arc::clone(&queue));
        Subscription {
            id,
            queue,
            bus: self.clone(),
        }
    }

    /// Removes a subscriber and discards its queue.
    pub fn unsubscribe(&self, id: Uuid) {
        let removed = self
            .subscribers
            .write()
            .expect("subscriber registry poisoned")
            .remove(&id);
        if let Some(queue) = removed {
            queue.close();
        }
    }

    /// Delivers an event to every currently registered subscriber.
    ///
    /// Never blocks and never fails: with zero subscribers this is a no-op,
    /// and a full queue is resolved by the configured overflow policy.
    pub fn publish(&self, event: &ChangeEvent) {
        let subscribers = self
            .subscribers
            .read()
            .expect("subscriber registry poisoned");
        for (id, queue) in subscribers.iter() {
            let before = queue.dropped.load(Ordering::Relaxed);
            queue.push(event, self.capacity, self.policy);
            if queue.dropped.load(Ordering::Relaxed) > before {
                tracing::warn!(
                    subscriber = %id,
                    service_id = event.service_id,
                    "subscriber queue full, dropping per overflow policy"
                );
            }
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("subscriber registry poisoned")
            .len()
    }
}

/// Handle to one subscriber's event queue.
pub struct Subscription {
    id: Uuid,
    queue: Arc<SubscriberQueue>,
    bus: StatusBus,
}

impl Subscription {
    /// The subscriber's registry id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receives the next event, waiting if the queue is empty.
    ///
    /// Returns `None` once the subscription has been unsubscribed and its
    /// queue drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Pops the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.queue
            .events
            .lock()
            .expect("subscriber queue poisoned")
            .pop_front()
    }

    /// Number of events dropped for this subscriber by the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
