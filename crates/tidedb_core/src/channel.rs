//! Multi-instance channel: cross-instance transport for event bulks.
//!
//! Database instances sharing the same physical storage (other tabs, other
//! worker processes) exchange [`ChangeEventBulk`]s over an instance channel.
//! The channel is a dumb transport: all filtering (origin token, storage
//! token, internal flag) happens at the database layer on both sides.

use crate::error::DbResult;
use crate::event::ChangeEventBulk;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Buffered bulks per channel subscriber.
const CHANNEL_CAPACITY: usize = 1024;

/// A cross-instance transport for change-event bulks.
///
/// Implementations may deliver posted bulks back to the posting instance;
/// receivers must filter echoes by origin instance token.
#[async_trait]
pub trait InstanceChannel: Send + Sync {
    /// The topic this channel is attached to.
    fn topic(&self) -> &str;

    /// Posts a bulk to all instances on the topic.
    ///
    /// Posting to a closed channel is a no-op.
    async fn post(&self, bulk: ChangeEventBulk) -> DbResult<()>;

    /// Subscribes to bulks arriving on the topic.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeEventBulk>;

    /// Closes the channel. Subscriptions created from it end.
    async fn close(&self) -> DbResult<()>;
}

/// Process-wide hub connecting [`LocalChannel`]s by topic.
static CHANNEL_HUB: LazyLock<Mutex<HashMap<String, broadcast::Sender<ChangeEventBulk>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// An in-process instance channel.
///
/// Connects database instances living in the same process (the
/// "several handles on the same storage" case). Cross-process transports
/// implement [`InstanceChannel`] externally.
///
/// Posted bulks are delivered to every subscriber on the topic, the posting
/// channel's own subscribers included; the database's reception guard drops
/// such echoes by origin token.
#[derive(Debug)]
pub struct LocalChannel {
    topic: String,
    sender: broadcast::Sender<ChangeEventBulk>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl LocalChannel {
    /// Opens a channel on the given topic, joining instances already there.
    #[must_use]
    pub fn open(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        let sender = CHANNEL_HUB
            .lock()
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        Self {
            topic,
            sender,
            forwarders: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl InstanceChannel for LocalChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn post(&self, bulk: ChangeEventBulk) -> DbResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            tracing::trace!(topic = %self.topic, "dropping post to closed channel");
            return Ok(());
        }
        // No subscriber on the topic is fine.
        let _ = self.sender.send(bulk);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeEventBulk> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hub_rx = self.sender.subscribe();
        let topic = self.topic.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match hub_rx.recv().await {
                    Ok(bulk) => {
                        if tx.send(bulk).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%topic, skipped, "channel subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.forwarders.lock().push(forwarder);
        rx
    }

    async fn close(&self) -> DbResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for forwarder in self.forwarders.lock().drain(..) {
            forwarder.abort();
        }
        // Drop the hub entry once no instance listens on the topic anymore.
        let mut hub = CHANNEL_HUB.lock();
        if let Some(sender) = hub.get(&self.topic) {
            if sender.receiver_count() == 0 {
                hub.remove(&self.topic);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeEvent, ChangeOperation};

    fn bulk(instance_token: &str) -> ChangeEventBulk {
        ChangeEventBulk::new(
            instance_token,
            Some("storage".to_string()),
            vec![ChangeEvent {
                operation: ChangeOperation::Insert,
                document_id: "doc".to_string(),
                collection_name: "heroes".to_string(),
                payload: None,
            }],
        )
    }

    #[tokio::test]
    async fn bulks_cross_between_channels_on_one_topic() {
        let a = LocalChannel::open("test:cross:socket");
        let b = LocalChannel::open("test:cross:socket");
        let mut rx = b.subscribe();

        let sent = bulk("instance-a");
        a.post(sent.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn own_posts_echo_back_to_subscribers() {
        let channel = LocalChannel::open("test:echo:socket");
        let mut rx = channel.subscribe();

        let sent = bulk("instance-a");
        channel.post(sent.clone()).await.unwrap();

        // Echo suppression is the receiver's job, not the channel's.
        let received = rx.recv().await.unwrap();
        assert_eq!(received.instance_token, "instance-a");

        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let a = LocalChannel::open("test:isolated-a:socket");
        let b = LocalChannel::open("test:isolated-b:socket");
        let mut rx = b.subscribe();

        a.post(bulk("instance-a")).await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_drops_posts() {
        let channel = LocalChannel::open("test:close:socket");
        let mut rx = channel.subscribe();
        channel.close().await.unwrap();

        channel.post(bulk("instance-a")).await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
