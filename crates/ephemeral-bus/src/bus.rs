//! The topic registry (§4.2): a set of named `broadcast` channels created
//! lazily on first subscribe or publish, each with a fixed capacity shared by
//! the whole bus. Every stream on the transport, every Discovery/Activation
//! FSM driver loop, and every CLI test harness subscribes through here.

use ephemeral_core::{CoordError, Event};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// A named-topic, multi-subscriber event bus.
///
/// Cloning an `EventBus` is cheap and shares the same topic registry; this is
/// the handle type passed around the rest of the coordination plane.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl EventBus {
    /// Create a bus whose topics each buffer up to `capacity` unread events
    /// per subscriber before lagging receivers start dropping the oldest.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                topics: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to `topic`, creating it if this is the first subscriber.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        if let Some(sender) = self.inner.topics.read().await.get(topic) {
            return sender.subscribe();
        }
        let mut topics = self.inner.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    /// Publish `event` to the topic named by `event.meta.target_topic()`.
    ///
    /// Publishing to a topic with no subscribers is not an error — it is the
    /// ordinary case for, e.g., `clientOutgoingEvents` before any player has
    /// connected — but a channel send failure for any other reason (the
    /// topic existed and then every receiver was dropped mid-send) is
    /// reported rather than swallowed.
    pub async fn publish(&self, event: Event) -> Result<(), CoordError> {
        let topic = event.meta.target_topic().to_string();
        let sender = {
            let topics = self.inner.topics.read().await;
            topics.get(&topic).cloned()
        };
        let sender = match sender {
            Some(sender) => sender,
            None => {
                let mut topics = self.inner.topics.write().await;
                topics
                    .entry(topic.clone())
                    .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                    .clone()
            }
        };
        match sender.send(event) {
            Ok(_subscriber_count) => Ok(()),
            Err(broadcast::error::SendError(_)) => {
                tracing::trace!(topic = %topic, "publish with no subscribers");
                Ok(())
            }
        }
    }

    /// Number of topics created so far. Exposed for tests and diagnostics.
    pub async fn topic_count(&self) -> usize {
        self.inner.topics.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::topics;

    #[tokio::test]
    async fn subscriber_receives_events_published_after_it_subscribes() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe(topics::DISCOVERY).await;
        bus.publish(Event::routed("PlayerReady", None, topics::DISCOVERY, vec![]))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "PlayerReady");
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_error() {
        let bus = EventBus::new(16);
        bus.publish(Event::routed("Orphaned", None, "nobody-listening", vec![]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_their_own_copy() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe(topics::DISCOVERY).await;
        let mut b = bus.subscribe(topics::DISCOVERY).await;
        bus.publish(Event::routed("PlayersReady", None, topics::DISCOVERY, vec![]))
            .await
            .unwrap();
        assert_eq!(a.recv().await.unwrap().name, "PlayersReady");
        assert_eq!(b.recv().await.unwrap().name, "PlayersReady");
    }
}
