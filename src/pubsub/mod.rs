//! In-process publish/subscribe for domain change notifications
//!
//! Unlike the persistent store, events are only delivered to currently
//! registered subscribers and are never retained: a subscriber connecting
//! after a publish does not see past events.
//!
//! Delivery is hand-off based: every subscriber owns a bounded channel and
//! `publish` uses `try_send`, so a slow or stuck subscriber can never block
//! the publisher or delay its siblings. A subscriber whose buffer would
//! overflow is kicked off the bus instead.
//!
//! The bus is created once at process start and handed to whatever needs it
//! by cloning; there is no global instance. `shutdown` closes every live
//! session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LibrisError, Result};
use crate::store::{AuthorRecord, BookRecord};

mod session;

pub use session::{SessionState, SubscriptionSession};

/// Topic carrying newly added books
pub const TOPIC_BOOK_ADDED: &str = "book-added";

/// An event delivered through the bus
#[derive(Debug, Clone)]
pub struct Event {
    /// Topic the event was published to
    pub topic: String,
    /// Domain snapshot attached to the publish
    pub payload: EventPayload,
    /// Publish time (Unix millis)
    pub timestamp: u64,
}

/// Domain snapshots carried by events
#[derive(Debug, Clone)]
pub enum EventPayload {
    BookAdded(BookAdded),
}

/// Snapshot of a newly created book, author populated
#[derive(Debug, Clone)]
pub struct BookAdded {
    pub book: BookRecord,
    pub author: AuthorRecord,
    pub author_book_count: u64,
}

/// Configuration for the event bus
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Buffered events per subscriber before it is kicked
    pub subscriber_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

/// One registered subscriber's send side
#[derive(Clone)]
struct SubscriberHandle {
    id: Uuid,
    tx: mpsc::Sender<Event>,
    /// Set when the bus force-disconnects this subscriber (overflow or
    /// shutdown); the session discards buffered events once it is set.
    kicked: Arc<AtomicBool>,
}

/// Per-topic registry state
struct TopicState {
    subscribers: RwLock<Vec<SubscriberHandle>>,
    /// Serializes publishes so every subscriber observes one per-topic order
    delivery: Mutex<()>,
    published: AtomicU64,
}

impl TopicState {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            delivery: Mutex::new(()),
            published: AtomicU64::new(0),
        }
    }
}

pub(crate) struct BusInner {
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    config: BusConfig,
    shutdown: AtomicBool,
    events_published: AtomicU64,
    sessions_opened: AtomicU64,
    subscribers_kicked: AtomicU64,
}

impl BusInner {
    pub(crate) fn deregister(&self, topic: &str, id: Uuid) {
        let state = { self.topics.read().get(topic).cloned() };
        if let Some(state) = state {
            state.subscribers.write().retain(|s| s.id != id);
            debug!(topic, subscriber = %id, "subscriber deregistered");
        }
    }
}

/// Statistics for one topic
#[derive(Debug, Clone)]
pub struct TopicStats {
    pub name: String,
    pub subscribers: usize,
    pub events_published: u64,
}

/// Overall bus statistics
#[derive(Debug, Clone)]
pub struct BusStats {
    pub topics: Vec<TopicStats>,
    pub total_subscribers: usize,
    pub events_published: u64,
    pub sessions_opened: u64,
    pub subscribers_kicked: u64,
}

/// Handle to the process-wide event bus. Cheap to clone; all clones share
/// the same topic registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: RwLock::new(HashMap::new()),
                config,
                shutdown: AtomicBool::new(false),
                events_published: AtomicU64::new(0),
                sessions_opened: AtomicU64::new(0),
                subscribers_kicked: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber on a topic.
    ///
    /// The topic is created on first subscription. After `shutdown` the
    /// returned session is already closed.
    pub fn subscribe(&self, topic: &str) -> Result<SubscriptionSession> {
        validate_topic_name(topic)?;

        let (tx, rx) = mpsc::channel(self.inner.config.subscriber_buffer);
        let kicked = Arc::new(AtomicBool::new(
            self.inner.shutdown.load(Ordering::SeqCst),
        ));
        let handle = SubscriberHandle {
            id: Uuid::new_v4(),
            tx,
            kicked: Arc::clone(&kicked),
        };
        let id = handle.id;

        if !self.inner.shutdown.load(Ordering::SeqCst) {
            let state = {
                let mut topics = self.inner.topics.write();
                Arc::clone(
                    topics
                        .entry(topic.to_string())
                        .or_insert_with(|| Arc::new(TopicState::new())),
                )
            };
            state.subscribers.write().push(handle);
            self.inner.sessions_opened.fetch_add(1, Ordering::Relaxed);
            debug!(topic, subscriber = %id, "subscriber registered");
        }

        Ok(SubscriptionSession::new(
            Arc::clone(&self.inner),
            topic.to_string(),
            id,
            rx,
            kicked,
        ))
    }

    /// Publish an event to every subscriber registered on the topic at this
    /// moment. Synchronous; never blocks on subscriber progress. Returns the
    /// number of subscribers the event was handed to.
    ///
    /// Fails only on an invalid topic name. Publishing to a topic nobody has
    /// subscribed to delivers to nobody (events are not retained).
    pub fn publish(&self, topic: &str, payload: EventPayload) -> Result<usize> {
        validate_topic_name(topic)?;

        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Ok(0);
        }

        let state = { self.inner.topics.read().get(topic).cloned() };
        let Some(state) = state else {
            return Ok(0);
        };

        // One publisher at a time per topic: this is what makes the order
        // each subscriber observes identical to publish order.
        let _ordering = state.delivery.lock();

        let snapshot: Vec<SubscriberHandle> = state.subscribers.read().clone();
        let event = Event {
            topic: topic.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        };

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();
        for subscriber in &snapshot {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    subscriber.kicked.store(true, Ordering::SeqCst);
                    dead.push(subscriber.id);
                    self.inner.subscribers_kicked.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        topic,
                        subscriber = %subscriber.id,
                        "subscriber buffer overflow, disconnecting"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(subscriber.id);
                }
            }
        }

        if !dead.is_empty() {
            state
                .subscribers
                .write()
                .retain(|s| !dead.contains(&s.id));
        }

        state.published.fetch_add(1, Ordering::Relaxed);
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);
        debug!(topic, subscribers = delivered, "published event");
        Ok(delivered)
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .read()
            .get(topic)
            .map(|state| state.subscribers.read().len())
            .unwrap_or(0)
    }

    /// Statistics for one topic.
    pub fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        self.inner.topics.read().get(topic).map(|state| TopicStats {
            name: topic.to_string(),
            subscribers: state.subscribers.read().len(),
            events_published: state.published.load(Ordering::Relaxed),
        })
    }

    /// Statistics across all topics.
    pub fn all_stats(&self) -> BusStats {
        let topics = self.inner.topics.read();
        let topic_stats: Vec<TopicStats> = topics
            .iter()
            .map(|(name, state)| TopicStats {
                name: name.clone(),
                subscribers: state.subscribers.read().len(),
                events_published: state.published.load(Ordering::Relaxed),
            })
            .collect();
        let total_subscribers = topic_stats.iter().map(|s| s.subscribers).sum();

        BusStats {
            topics: topic_stats,
            total_subscribers,
            events_published: self.inner.events_published.load(Ordering::Relaxed),
            sessions_opened: self.inner.sessions_opened.load(Ordering::Relaxed),
            subscribers_kicked: self.inner.subscribers_kicked.load(Ordering::Relaxed),
        }
    }

    /// Tear the bus down: every live session closes, discarding anything
    /// still buffered. Publishes after shutdown deliver to nobody.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let mut topics = self.inner.topics.write();
        for (name, state) in topics.drain() {
            let mut subscribers = state.subscribers.write();
            for subscriber in subscribers.drain(..) {
                subscriber.kicked.store(true, Ordering::SeqCst);
            }
            info!(topic = %name, "topic closed");
        }
        info!("event bus shut down");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

fn validate_topic_name(topic: &str) -> Result<()> {
    let valid = !topic.is_empty()
        && topic
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LibrisError::validation_with_input(
            "topic names must be non-empty lowercase alphanumerics or dashes",
            topic,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn sample_payload(title: &str) -> EventPayload {
        let author = AuthorRecord {
            id: Uuid::new_v4(),
            name: "Test Author".to_string(),
            born: None,
        };
        EventPayload::BookAdded(BookAdded {
            book: BookRecord {
                id: Uuid::new_v4(),
                title: title.to_string(),
                published: 2020,
                genres: vec!["test".to_string()],
                author_id: author.id,
            },
            author,
            author_book_count: 1,
        })
    }

    fn title_of(event: &Event) -> String {
        let EventPayload::BookAdded(added) = &event.payload;
        added.book.title.clone()
    }

    async fn next_with_timeout(session: &mut SubscriptionSession) -> Option<Event> {
        timeout(Duration::from_millis(200), session.next_event())
            .await
            .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut session = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();

        let delivered = bus.publish(TOPIC_BOOK_ADDED, sample_payload("Dune")).unwrap();
        assert_eq!(delivered, 1);

        let event = next_with_timeout(&mut session).await.expect("one event");
        assert_eq!(event.topic, TOPIC_BOOK_ADDED);
        assert_eq!(title_of(&event), "Dune");
    }

    #[tokio::test]
    async fn fan_out_to_all_active_subscribers() {
        let bus = EventBus::default();
        let mut first = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        let mut second = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        let mut third = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();

        let delivered = bus.publish(TOPIC_BOOK_ADDED, sample_payload("Dune")).unwrap();
        assert_eq!(delivered, 3);

        for session in [&mut first, &mut second, &mut third] {
            let event = next_with_timeout(session).await.expect("one event");
            assert_eq!(title_of(&event), "Dune");
        }
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::default();
        let mut session = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();

        for title in ["one", "two", "three", "four", "five"] {
            bus.publish(TOPIC_BOOK_ADDED, sample_payload(title)).unwrap();
        }

        for expected in ["one", "two", "three", "four", "five"] {
            let event = next_with_timeout(&mut session).await.expect("event");
            assert_eq!(title_of(&event), expected);
        }
    }

    #[tokio::test]
    async fn late_joiner_sees_no_replay() {
        let bus = EventBus::default();
        let mut early = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();

        bus.publish(TOPIC_BOOK_ADDED, sample_payload("before")).unwrap();

        let mut late = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("after")).unwrap();

        assert_eq!(title_of(&next_with_timeout(&mut early).await.unwrap()), "before");
        assert_eq!(title_of(&next_with_timeout(&mut early).await.unwrap()), "after");

        let first_for_late = next_with_timeout(&mut late).await.expect("event");
        assert_eq!(title_of(&first_for_late), "after");
    }

    #[tokio::test]
    async fn unsubscribe_drains_buffered_then_closes() {
        let bus = EventBus::default();
        let mut session = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();

        bus.publish(TOPIC_BOOK_ADDED, sample_payload("one")).unwrap();
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("two")).unwrap();

        session.unsubscribe();
        assert_eq!(session.state(), SessionState::Draining);

        // Published strictly after deregistration: must never arrive.
        let delivered = bus.publish(TOPIC_BOOK_ADDED, sample_payload("after")).unwrap();
        assert_eq!(delivered, 0);

        assert_eq!(title_of(&session.next_event().await.unwrap()), "one");
        assert_eq!(title_of(&session.next_event().await.unwrap()), "two");
        assert!(session.next_event().await.is_none());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn overflow_kicks_only_the_slow_subscriber() {
        let bus = EventBus::new(BusConfig {
            subscriber_buffer: 2,
        });
        let mut slow = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();

        bus.publish(TOPIC_BOOK_ADDED, sample_payload("one")).unwrap();
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("two")).unwrap();
        // Third event overflows the buffer of the never-polling subscriber.
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("three")).unwrap();

        // The kicked session closes and discards what it had buffered.
        assert!(slow.next_event().await.is_none());
        assert_eq!(slow.state(), SessionState::Closed);
        assert_eq!(bus.subscriber_count(TOPIC_BOOK_ADDED), 0);
        assert_eq!(bus.all_stats().subscribers_kicked, 1);

        // The bus keeps working for everyone else.
        let mut fresh = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("four")).unwrap();
        assert_eq!(title_of(&next_with_timeout(&mut fresh).await.unwrap()), "four");
    }

    #[tokio::test]
    async fn dropping_a_session_releases_its_registration() {
        let bus = EventBus::default();
        let session = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        assert_eq!(bus.subscriber_count(TOPIC_BOOK_ADDED), 1);

        drop(session);
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("gone")).unwrap();
        assert_eq!(bus.subscriber_count(TOPIC_BOOK_ADDED), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_all_sessions() {
        let bus = EventBus::default();
        let mut session = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        bus.publish(TOPIC_BOOK_ADDED, sample_payload("buffered")).unwrap();

        bus.shutdown();

        // Buffered events are discarded on shutdown.
        assert!(session.next_event().await.is_none());
        assert_eq!(session.state(), SessionState::Closed);

        // Subscribing after shutdown yields a dead session.
        let mut post = bus.subscribe(TOPIC_BOOK_ADDED).unwrap();
        assert!(post.next_event().await.is_none());

        assert_eq!(bus.publish(TOPIC_BOOK_ADDED, sample_payload("x")).unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_topic_names_are_rejected() {
        let bus = EventBus::default();
        assert!(bus.publish("", sample_payload("x")).is_err());
        assert!(bus.publish("Bad Topic!", sample_payload("x")).is_err());
        assert!(bus.subscribe("UPPER").is_err());
        assert!(bus.publish("book-added", sample_payload("x")).is_ok());
    }

    #[tokio::test]
    async fn publish_without_subscribers_delivers_to_nobody() {
        let bus = EventBus::default();
        let delivered = bus.publish("empty-topic", sample_payload("x")).unwrap();
        assert_eq!(delivered, 0);
    }
}
