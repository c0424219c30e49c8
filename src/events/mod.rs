//! In-process event bus for board notifications.
//!
//! Decouples "something happened" from "who needs to know": the business
//! service publishes to named channels, and each live client connection holds
//! a filtered [`Subscription`]. Built on `tokio::sync::broadcast`, one sender
//! per channel. The bus is an explicitly constructed component handed to its
//! users by reference; there is no module-level singleton.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Channel for newly created tickets.
pub const TICKET_CREATED: &str = "ticket_created";
/// Channel for mutated tickets (field edits, moves, assignment changes).
pub const TICKET_UPDATED: &str = "ticket_updated";
/// Channel for hard-deleted tickets.
pub const TICKET_DELETED: &str = "ticket_deleted";
/// Channel for newly added comments.
pub const COMMENT_ADDED: &str = "comment_added";

/// Maximum events buffered per subscriber before older ones are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A structured payload published on one channel.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Channel the event was published on
    pub channel: String,

    /// Project scope, when the event concerns one project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,

    /// Event body (typically the affected entity as JSON)
    pub payload: serde_json::Value,
}

impl Event {
    /// Build an event scoped to a project.
    pub fn for_project(channel: &str, project_id: i64, payload: serde_json::Value) -> Self {
        Self {
            channel: channel.to_string(),
            project_id: Some(project_id),
            payload,
        }
    }
}

/// Per-subscription filter, evaluated against every delivered payload.
///
/// Publishers stay unaware of filtering: a ticket channel scoped by project is
/// just a subscription with a `project_id` filter.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only deliver events scoped to this project
    pub project_id: Option<i64>,
}

impl EventFilter {
    /// Match everything on the channel.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match only events scoped to the given project.
    pub fn project(project_id: i64) -> Self {
        Self {
            project_id: Some(project_id),
        }
    }

    /// Whether an event passes this filter.
    pub fn matches(&self, event: &Event) -> bool {
        match self.project_id {
            Some(id) => event.project_id == Some(id),
            None => true,
        }
    }
}

/// In-process publish/subscribe hub keyed by channel name.
pub struct EventBus {
    /// One broadcast sender per channel, created lazily on first use.
    senders: RwLock<HashMap<String, broadcast::Sender<Event>>>,

    /// Active subscription count per channel (for cleanup accounting).
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total events published since construction.
    events_published: AtomicU64,

    /// Buffer capacity used for new channels.
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the default per-channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with an explicit per-channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Publish an event to its channel.
    ///
    /// Returns the number of live subscribers that received it. Delivery is
    /// best-effort: a bus with no subscribers simply drops the event.
    pub fn publish(&self, event: Event) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender_for(&event.channel);
        let channel = event.channel.clone();
        match sender.send(event) {
            Ok(receivers) => {
                debug!(channel = %channel, receivers, "event published");
                receivers
            }
            Err(_) => {
                debug!(channel = %channel, "event published with no subscribers");
                0
            }
        }
    }

    /// Subscribe to every event on a channel.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        self.subscribe_filtered(channel, EventFilter::all())
    }

    /// Subscribe to a channel with a per-payload filter.
    pub fn subscribe_filtered(&self, channel: &str, filter: EventFilter) -> Subscription {
        let receiver = self.sender_for(channel).subscribe();
        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(channel.to_string()).or_insert(0) += 1;
        }
        debug!(channel = %channel, "subscription created");
        Subscription {
            receiver,
            filter,
            subscriptions: Arc::clone(&self.subscriptions),
            channel: channel.to_string(),
        }
    }

    /// Number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscriptions
            .read()
            .ok()
            .and_then(|subs| subs.get(channel).copied())
            .unwrap_or(0)
    }

    /// Total events published since the bus was constructed.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Get or lazily create the sender for a channel.
    fn sender_for(&self, channel: &str) -> broadcast::Sender<Event> {
        if let Ok(senders) = self.senders.read() {
            if let Some(sender) = senders.get(channel) {
                return sender.clone();
            }
        }
        let mut senders = match self.senders.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live, cancellable subscription to one channel.
///
/// Dropping the subscription releases its receiver and accounting entry;
/// other subscribers on the same channel are unaffected.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    filter: EventFilter,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    channel: String,
}

impl Subscription {
    /// Receive the next event that passes the filter.
    ///
    /// Returns `None` when the bus side of the channel is gone. A lagged
    /// subscriber skips the dropped events and keeps receiving.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(channel = %self.channel, skipped, "subscriber lagged");
                    continue;
                }
            };
            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// The filter this subscription was created with.
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        if let Some(count) = subs.get_mut(&self.channel) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.channel);
            }
        }
        debug!(channel = %self.channel, "subscription dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn ticket_event(project_id: i64) -> Event {
        Event::for_project(
            TICKET_CREATED,
            project_id,
            serde_json::json!({ "id": 1, "title": "t" }),
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(TICKET_CREATED);

        assert_eq!(bus.publish(ticket_event(1)), 1);

        let event = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event.channel, TICKET_CREATED);
        assert_eq!(event.project_id, Some(1));
    }

    #[tokio::test]
    async fn test_project_filter() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_filtered(TICKET_CREATED, EventFilter::project(2));

        bus.publish(ticket_event(1));
        bus.publish(ticket_event(2));

        let event = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event.project_id, Some(2));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = EventBus::new();
        let mut created = bus.subscribe(TICKET_CREATED);
        let mut updated = bus.subscribe(TICKET_UPDATED);

        bus.publish(Event::for_project(
            TICKET_UPDATED,
            7,
            serde_json::json!({}),
        ));

        let event = timeout(Duration::from_millis(100), updated.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event.channel, TICKET_UPDATED);

        // Nothing arrives on the created channel.
        let nothing = timeout(Duration::from_millis(50), created.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let bus = EventBus::new();
        let sub_a = bus.subscribe(TICKET_DELETED);
        let sub_b = bus.subscribe(TICKET_DELETED);
        assert_eq!(bus.subscriber_count(TICKET_DELETED), 2);

        drop(sub_a);
        assert_eq!(bus.subscriber_count(TICKET_DELETED), 1);

        // Remaining subscriber still receives.
        let mut sub_b = sub_b;
        bus.publish(Event::for_project(
            TICKET_DELETED,
            1,
            serde_json::json!({}),
        ));
        let event = timeout(Duration::from_millis(100), sub_b.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event.channel, TICKET_DELETED);

        drop(sub_b);
        assert_eq!(bus.subscriber_count(TICKET_DELETED), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(ticket_event(1)), 0);
        assert_eq!(bus.events_published(), 1);
    }
}
