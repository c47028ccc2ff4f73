//! Change events, event bulks, and the deduplicating event bus.
//!
//! Mutations are transported as *bulks*: a batch of change events plus the
//! origin tokens needed for cross-instance filtering. Sending one bulk
//! instead of many small events keeps the cross-instance channel cheap.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// How long accepted bulk ids are remembered for deduplication.
///
/// This bounds the "already seen" set in memory. It is an approximation of an
/// exact set: correct as long as no duplicate delivery of the same bulk is
/// delayed longer than the window, which holds because channel delivery is
/// near-immediate.
pub const EVENT_BULK_ID_RETENTION: Duration = Duration::from_secs(60);

/// Capacity of the bus's broadcast buffer per subscriber.
const EVENT_BUS_CAPACITY: usize = 1024;

/// The kind of change a single event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    /// Document was inserted.
    Insert,
    /// Document was updated.
    Update,
    /// Document was deleted.
    Delete,
}

/// A single document change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The kind of change.
    pub operation: ChangeOperation,
    /// Primary key of the changed document.
    pub document_id: String,
    /// Collection the document belongs to.
    pub collection_name: String,
    /// The new document payload. `None` for deletes.
    pub payload: Option<serde_json::Value>,
}

/// A batch of change events, the unit of bus acceptance and cross-instance
/// transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEventBulk {
    /// Unique id of the bulk. A bulk is delivered to a given bus at most
    /// once per id.
    pub id: String,
    /// Token of the database instance that produced the bulk.
    pub instance_token: String,
    /// Storage token of the physical storage the bulk was written to.
    /// `None` for bulks synthesized before the token resolved.
    pub storage_token: Option<String>,
    /// Internal bulks never leave the process.
    pub internal: bool,
    /// The events, in write order.
    pub events: Vec<ChangeEvent>,
}

impl ChangeEventBulk {
    /// Creates a bulk with a fresh unique id.
    #[must_use]
    pub fn new(
        instance_token: impl Into<String>,
        storage_token: Option<String>,
        events: Vec<ChangeEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            instance_token: instance_token.into(),
            storage_token,
            internal: false,
            events,
        }
    }

    /// Creates an internal bulk that must never be rebroadcast.
    #[must_use]
    pub fn internal(instance_token: impl Into<String>, events: Vec<ChangeEvent>) -> Self {
        Self {
            internal: true,
            ..Self::new(instance_token, None, events)
        }
    }
}

/// A time-bounded set of recently seen ids.
///
/// Entries older than the retention window are evicted on insert, so memory
/// use is bounded by the insert rate times the window.
#[derive(Debug)]
pub(crate) struct RecentIds {
    retention: Duration,
    inner: Mutex<RecentIdsInner>,
}

#[derive(Debug, Default)]
struct RecentIdsInner {
    ids: HashSet<String>,
    by_age: VecDeque<(Instant, String)>,
}

impl RecentIds {
    pub(crate) fn new(retention: Duration) -> Self {
        Self {
            retention,
            inner: Mutex::new(RecentIdsInner::default()),
        }
    }

    /// Records an id. Returns false if the id was already present within the
    /// retention window.
    pub(crate) fn insert(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        while inner
            .by_age
            .front()
            .is_some_and(|(seen, _)| now.duration_since(*seen) >= self.retention)
        {
            if let Some((_, old)) = inner.by_age.pop_front() {
                inner.ids.remove(&old);
            }
        }
        if inner.ids.contains(id) {
            return false;
        }
        inner.ids.insert(id.to_string());
        inner.by_age.push_back((now, id.to_string()));
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().ids.len()
    }
}

/// The per-instance change event bus.
///
/// Accepts bulks, deduplicates them by id within a bounded window, and fans
/// them out to subscribers in acceptance order.
#[derive(Debug)]
pub struct EventBus {
    sender: RwLock<Option<broadcast::Sender<ChangeEventBulk>>>,
    seen: RecentIds,
}

impl EventBus {
    /// Creates a bus with the default dedup retention window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(EVENT_BULK_ID_RETENTION)
    }

    /// Creates a bus with a custom dedup retention window.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            sender: RwLock::new(Some(sender)),
            seen: RecentIds::new(retention),
        }
    }

    /// Accepts a bulk into the bus.
    ///
    /// Returns true if the bulk was newly accepted; false if it was a
    /// duplicate of a recently seen bulk or the bus is already closed.
    /// Newly accepted bulks should also be offered to the multi-instance
    /// channel by the caller.
    pub fn accept(&self, bulk: ChangeEventBulk) -> bool {
        if !self.seen.insert(&bulk.id) {
            return false;
        }
        match &*self.sender.read() {
            Some(sender) => {
                // No live subscriber is fine; the bulk is simply dropped.
                let _ = sender.send(bulk);
                true
            }
            None => false,
        }
    }

    /// Subscribes to accepted bulks.
    ///
    /// Returns `None` when the bus is already closed.
    pub fn subscribe_bulks(&self) -> Option<broadcast::Receiver<ChangeEventBulk>> {
        self.sender.read().as_ref().map(|s| s.subscribe())
    }

    /// Subscribes to the merged stream of individual change events.
    ///
    /// Events within a bulk keep their relative order and bulks are flattened
    /// in acceptance order. Returns `None` when the bus is already closed.
    pub fn subscribe(&self) -> Option<EventStream> {
        self.subscribe_bulks().map(|receiver| EventStream {
            receiver,
            buffered: VecDeque::new(),
        })
    }

    /// Closes the bus, releasing all subscribers.
    ///
    /// After closing, `accept` drops every bulk and subscriptions end.
    pub fn close(&self) {
        self.sender.write().take();
    }

    /// Whether the bus has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription yielding individual change events flattened out of bulks.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<ChangeEventBulk>,
    buffered: VecDeque<ChangeEvent>,
}

impl EventStream {
    /// Returns the next change event, or `None` once the bus is closed and
    /// all buffered events were consumed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            if let Some(event) = self.buffered.pop_front() {
                return Some(event);
            }
            match self.receiver.recv().await {
                Ok(bulk) => self.buffered.extend(bulk.events),
                // A lagged subscriber skips what it missed and keeps going.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> ChangeEvent {
        ChangeEvent {
            operation: ChangeOperation::Insert,
            document_id: id.to_string(),
            collection_name: "heroes".to_string(),
            payload: Some(serde_json::json!({ "id": id })),
        }
    }

    #[test]
    fn recent_ids_reject_duplicates() {
        let seen = RecentIds::new(Duration::from_secs(60));
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("b"));
    }

    #[test]
    fn recent_ids_evict_by_age() {
        let seen = RecentIds::new(Duration::from_millis(10));
        assert!(seen.insert("a"));
        std::thread::sleep(Duration::from_millis(25));
        // Eviction happens on insert; the expired id is accepted again.
        assert!(seen.insert("a"));
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_bulk_ids_deliver_once() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_bulks().unwrap();

        let bulk = ChangeEventBulk::new("token", None, vec![event("a")]);
        assert!(bus.accept(bulk.clone()));
        assert!(!bus.accept(bulk.clone()));

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.id, bulk.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn flattened_stream_preserves_order() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe().unwrap();

        bus.accept(ChangeEventBulk::new(
            "token",
            None,
            vec![event("a"), event("b")],
        ));
        bus.accept(ChangeEventBulk::new("token", None, vec![event("c")]));

        let ids: Vec<String> = vec![
            stream.next().await.unwrap().document_id,
            stream.next().await.unwrap().document_id,
            stream.next().await.unwrap().document_id,
        ];
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn close_releases_subscribers() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe().unwrap();

        bus.close();
        assert!(bus.is_closed());
        assert!(stream.next().await.is_none());

        // Bulks after close are dropped.
        assert!(!bus.accept(ChangeEventBulk::new("token", None, vec![event("x")])));
        assert!(bus.subscribe().is_none());
    }

    #[test]
    fn internal_bulk_is_flagged() {
        let bulk = ChangeEventBulk::internal("token", vec![]);
        assert!(bulk.internal);
        assert!(bulk.storage_token.is_none());
    }
}
