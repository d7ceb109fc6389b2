//! Subscription registry and event dispatcher.
//!
//! DESIGN
//! ======
//! Subscribers live in two groups: catch-all callbacks (see every event)
//! and topic callbacks keyed by string. `dispatch` routes one event as:
//!
//! 1. catch-all subscribers, registration order;
//! 2. subscribers keyed by the envelope type (`event.type`);
//! 3. subscribers keyed by `data.type`, when present and different from (2).
//!
//! The backend wraps everything under one envelope type; the business event
//! kind lives inside the payload.
//!
//! Each group is snapshotted under the lock and invoked after the lock is
//! released, so a callback may subscribe or unsubscribe re-entrantly.
//! Removal during a dispatch applies to the next dispatch.
//!
//! ERROR HANDLING
//! ==============
//! A panicking callback is caught, logged, and counted in the
//! [`DispatchReport`]. Remaining subscribers still run.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;

use crate::event::NotificationEvent;

/// Callback for catch-all subscribers.
pub type EventCallback = dyn Fn(&NotificationEvent) + Send + Sync;
/// Callback for topic subscribers. Receives `event.data`.
pub type TopicCallback = dyn Fn(&Value) + Send + Sync;

/// Identity of one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every event, regardless of type.
    All,
    /// Events whose envelope or payload type equals this name.
    Named(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Delivery outcome of a single [`SubscriberRegistry::dispatch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

impl DispatchReport {
    #[must_use]
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }

    fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    all: Vec<(SubscriptionId, Arc<EventCallback>)>,
    topics: HashMap<String, Vec<(SubscriptionId, Arc<TopicCallback>)>>,
}

impl RegistryInner {
    fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn remove(&mut self, topic: &Topic, id: SubscriptionId) -> bool {
        match topic {
            Topic::All => {
                let before = self.all.len();
                self.all.retain(|(entry_id, _)| *entry_id != id);
                self.all.len() != before
            }
            Topic::Named(name) => {
                let Some(entries) = self.topics.get_mut(name) else {
                    return false;
                };
                let before = entries.len();
                entries.retain(|(entry_id, _)| *entry_id != id);
                let removed = entries.len() != before;
                if entries.is_empty() {
                    self.topics.remove(name);
                }
                removed
            }
        }
    }

    fn topic_snapshot(&self, name: Option<&str>) -> Vec<(SubscriptionId, Arc<TopicCallback>)> {
        name.and_then(|name| self.topics.get(name))
            .cloned()
            .unwrap_or_default()
    }
}

/// Shared subscriber registry. Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback for every event.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        inner.all.push((id, Arc::new(callback)));
        Subscription::new(Arc::downgrade(&self.inner), Topic::All, id)
    }

    /// Register a callback for events whose effective topic is `topic`.
    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut inner = self.lock();
        let id = inner.allocate_id();
        inner
            .topics
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription::new(Arc::downgrade(&self.inner), Topic::Named(topic), id)
    }

    /// Deliver one event to every matching subscriber.
    pub fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        let (all, primary, secondary) = {
            let inner = self.lock();
            (
                inner.all.clone(),
                inner.topic_snapshot(Some(&event.event_type)),
                inner.topic_snapshot(event.secondary_topic()),
            )
        };

        let mut report = DispatchReport::default();
        for (id, callback) in &all {
            report.record(invoke(&Topic::All, *id, || callback(event)));
        }

        let primary_topic = Topic::Named(event.event_type.clone());
        for (id, callback) in &primary {
            report.record(invoke(&primary_topic, *id, || callback(&event.data)));
        }

        if let Some(name) = event.secondary_topic() {
            let secondary_topic = Topic::Named(name.to_owned());
            for (id, callback) in &secondary {
                report.record(invoke(&secondary_topic, *id, || callback(&event.data)));
            }
        }

        report
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.lock().topics.len()
    }

    /// Number of callbacks registered for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Number of catch-all callbacks.
    #[must_use]
    pub fn catch_all_count(&self) -> usize {
        self.lock().all.len()
    }

    /// Whether `topic` currently has an entry.
    #[must_use]
    pub fn has_topic(&self, topic: &str) -> bool {
        self.lock().topics.contains_key(topic)
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SubscriberRegistry")
            .field("catch_all", &inner.all.len())
            .field("topics", &inner.topics.len())
            .finish()
    }
}

fn invoke(topic: &Topic, id: SubscriptionId, call: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                %topic,
                subscription = id.0,
                panic = panic_message(payload.as_ref()),
                "hub: error in notification subscriber"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

/// Live registration. Dropping it (or calling [`Subscription::unsubscribe`])
/// removes exactly this callback.
#[must_use = "dropping the Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    topic: Topic,
    id: Option<SubscriptionId>,
}

impl Subscription {
    fn new(registry: Weak<Mutex<RegistryInner>>, topic: Topic, id: SubscriptionId) -> Self {
        Self { registry, topic, id: Some(id) }
    }

    /// A handle that is not attached to any registry.
    pub fn inert(topic: Topic) -> Self {
        Self { registry: Weak::new(), topic, id: None }
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// True while the callback is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.registry.strong_count() > 0
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.topic, id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
