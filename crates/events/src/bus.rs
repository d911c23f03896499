//! Per-user event bus backed by `tokio::sync::broadcast` channels.
//!
//! [`GiftEventBus`] holds one broadcast topic per user. The sync worker is
//! the only publisher; live-stream and poll-with-wait handlers subscribe.
//! It is designed to be shared via `Arc<GiftEventBus>` across the
//! application.
//!
//! Every subscriber gets its own bounded view of the channel: publishing
//! never waits on a subscriber, and a subscriber that falls more than
//! `capacity` events behind is disconnected instead of stalling the others.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::Stream;
use giftpanel_core::gift::Gift;
use giftpanel_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

// ---------------------------------------------------------------------------
// GiftEvent
// ---------------------------------------------------------------------------

/// Event type pushed when a user's merged snapshot changes.
pub const GIFTS_EVENT: &str = "gifts";

/// A snapshot change pushed to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    /// The full merged gift list after the change.
    pub payload: Vec<Gift>,

    pub count: usize,

    /// Content digest of `payload`.
    pub hash: String,

    pub published_at: DateTime<Utc>,
}

impl GiftEvent {
    /// Build a `gifts` event for a freshly published snapshot.
    pub fn gifts(payload: Vec<Gift>, hash: impl Into<String>) -> Self {
        Self {
            event_type: GIFTS_EVENT.to_string(),
            count: payload.len(),
            payload,
            hash: hash.into(),
            published_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// GiftEventBus
// ---------------------------------------------------------------------------

/// Default per-subscriber buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

type Topic = broadcast::Sender<Arc<GiftEvent>>;

/// Per-user fan-out bus for [`GiftEvent`]s.
pub struct GiftEventBus {
    topics: RwLock<HashMap<DbId, Topic>>,
    capacity: usize,
}

impl GiftEventBus {
    /// Create a bus whose subscribers may lag at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event to every live subscriber of `user_id`.
    ///
    /// Returns the number of subscribers the event was queued for. Events
    /// published while nobody is subscribed are dropped; the bus only
    /// delivers future changes.
    pub fn publish(&self, user_id: DbId, event: GiftEvent) -> usize {
        let event = Arc::new(event);
        let sent = {
            let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
            match topics.get(&user_id) {
                Some(sender) => sender.send(event).ok(),
                None => return 0,
            }
        };

        match sent {
            Some(receivers) => receivers,
            None => {
                // Zero receivers: drop the topic unless someone subscribed
                // between the two lock acquisitions.
                let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
                if topics
                    .get(&user_id)
                    .is_some_and(|sender| sender.receiver_count() == 0)
                {
                    topics.remove(&user_id);
                }
                0
            }
        }
    }

    /// Subscribe to future events for `user_id`.
    pub fn subscribe(&self, user_id: DbId) -> Subscription {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        let receiver = topics
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Subscription {
            user_id,
            receiver,
            closed: false,
        }
    }

    /// Number of live subscribers for `user_id`.
    pub fn subscriber_count(&self, user_id: DbId) -> usize {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Live subscribers across every user.
    pub fn total_subscribers(&self) -> usize {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|sender| sender.receiver_count())
            .sum()
    }
}

impl Default for GiftEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Why a [`Subscription`] stopped delivering events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionClosed {
    /// The subscriber fell too far behind and was disconnected.
    Overflowed { skipped: u64 },
    /// The bus was dropped.
    BusClosed,
}

/// One subscriber's receiving end of a user topic.
///
/// Dropping the subscription unsubscribes immediately and frees its buffer.
pub struct Subscription {
    user_id: DbId,
    receiver: broadcast::Receiver<Arc<GiftEvent>>,
    closed: bool,
}

impl Subscription {
    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    /// Wait for the next event, in publish order.
    ///
    /// Once this returns an error the subscription is finished; later calls
    /// keep returning [`SubscriptionClosed::BusClosed`].
    pub async fn recv(&mut self) -> Result<Arc<GiftEvent>, SubscriptionClosed> {
        if self.closed {
            return Err(SubscriptionClosed::BusClosed);
        }
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(RecvError::Lagged(skipped)) => {
                self.closed = true;
                tracing::warn!(
                    user_id = self.user_id,
                    skipped,
                    "Gift subscriber overflowed its buffer, disconnecting"
                );
                Err(SubscriptionClosed::Overflowed { skipped })
            }
            Err(RecvError::Closed) => {
                self.closed = true;
                Err(SubscriptionClosed::BusClosed)
            }
        }
    }

    /// Turn the subscription into a stream that ends on overflow.
    pub fn into_stream(self) -> impl Stream<Item = Arc<GiftEvent>> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await.ok()?;
            Some((event, sub))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
