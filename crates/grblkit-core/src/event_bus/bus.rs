//! Broker implementation.
//!
//! Fans a stream of values out to named subscribers, each with its own
//! bounded channel.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Subscription handle for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Configuration for the broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Channel capacity used by `subscribe_default`.
    pub default_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_capacity: 64,
        }
    }
}

struct Subscriber<T> {
    name: String,
    sender: mpsc::Sender<T>,
    dropped: u64,
}

/// Publish/subscribe fan-out
///
/// Every subscriber owns a bounded channel. A subscriber whose channel is
/// full misses the value; the others still receive it. Closing the broker
/// drops every sender, which ends every subscriber's stream.
pub struct Broker<T> {
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber<T>>>,
    closed: AtomicBool,
    config: BrokerConfig,
}

impl<T: Clone + Send + 'static> Broker<T> {
    /// Create a new broker with default configuration
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a new broker with custom configuration
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// Subscribe with a channel of `capacity` slots
    ///
    /// Subscribing to a closed broker yields a receiver that is already at
    /// end of stream.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> (SubscriptionId, mpsc::Receiver<T>) {
        let id = SubscriptionId::new();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let name = name.into();

        let mut subscribers = self.subscribers.write();
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("Subscription {} ({}) refused: broker closed", id, name);
            return (id, receiver);
        }
        tracing::debug!("Subscription {} ({}) added", id, name);
        subscribers.insert(
            id,
            Subscriber {
                name,
                sender,
                dropped: 0,
            },
        );
        (id, receiver)
    }

    /// Subscribe with the configured default capacity
    pub fn subscribe_default(&self, name: impl Into<String>) -> (SubscriptionId, mpsc::Receiver<T>) {
        self.subscribe(name, self.config.default_capacity)
    }

    /// Publish a value to all subscribers
    ///
    /// Returns the number of subscribers that accepted the value. Never
    /// blocks: full channels drop the value, closed channels are removed.
    pub fn publish(&self, value: T) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }

        let mut delivered = 0;
        let mut gone = Vec::new();
        {
            let mut subscribers = self.subscribers.write();
            for (id, subscriber) in subscribers.iter_mut() {
                match subscriber.sender.try_send(value.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        subscriber.dropped += 1;
                        tracing::warn!(
                            "Subscriber {} ({}) is lagging, {} values dropped",
                            id,
                            subscriber.name,
                            subscriber.dropped
                        );
                    }
                    Err(TrySendError::Closed(_)) => gone.push(*id),
                }
            }
            for id in gone {
                if let Some(subscriber) = subscribers.remove(&id) {
                    tracing::debug!("Subscription {} ({}) receiver dropped", id, subscriber.name);
                }
            }
        }
        delivered
    }

    /// Unsubscribe
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Close the broker, ending every subscriber's stream
    pub fn close(&self) {
        let mut subscribers = self.subscribers.write();
        self.closed.store(true, Ordering::SeqCst);
        subscribers.clear();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Get the current configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Broker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("subscribers", &self.subscribers.read().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("config", &self.config)
            .finish()
    }
}
