//! Consumer-facing subscription API.
//!
//! Features call these with the [`NotificationContext`] they were handed.
//! Every function tolerates a context whose hub is gone (or never existed):
//! it logs a warning and returns something inert instead of failing, so a
//! feature rendered outside the hub keeps working without notifications.
//!
//! Listeners keep the latest callback. [`NotificationListener::set_callback`]
//! swaps the function the registration calls without touching the registry,
//! so a feature can refresh captured state on every update and never
//! re-subscribe.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::watch;

use crate::event::NotificationEvent;
use crate::hub::NotificationContext;
use crate::registry::{EventCallback, Subscription, Topic, TopicCallback};
use crate::transport::{ConnectionState, ConnectionStatus};

type Slot<C> = Arc<RwLock<Arc<C>>>;

/// A registration created through the hooks. Dropping it unsubscribes.
#[must_use = "dropping the NotificationListener unsubscribes immediately"]
pub struct NotificationListener<C: ?Sized + 'static> {
    slot: Slot<C>,
    subscription: Subscription,
}

impl<C: ?Sized + 'static> NotificationListener<C> {
    /// False for listeners created without a hub, or once the hub is gone.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        self.subscription.topic()
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }

    fn replace(&self, callback: Arc<C>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = callback;
    }
}

impl NotificationListener<TopicCallback> {
    /// Route subsequent events to `callback`.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.replace(Arc::new(callback));
    }
}

impl NotificationListener<EventCallback> {
    /// Route subsequent events to `callback`.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.replace(Arc::new(callback));
    }
}

impl<C: ?Sized + 'static> fmt::Debug for NotificationListener<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationListener")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

fn current<C: ?Sized>(slot: &Slot<C>) -> Arc<C> {
    Arc::clone(&slot.read().unwrap_or_else(PoisonError::into_inner))
}

/// Listen for events whose envelope or payload type is `topic`.
pub fn use_notification<F>(
    ctx: &NotificationContext,
    topic: impl Into<String>,
    callback: F,
) -> NotificationListener<TopicCallback>
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    let topic = topic.into();
    let initial: Arc<TopicCallback> = Arc::new(callback);
    let slot = Arc::new(RwLock::new(initial));

    let Some(registry) = ctx.registry() else {
        tracing::warn!(%topic, "hub: use_notification called without an active notification hub");
        return NotificationListener { slot, subscription: Subscription::inert(Topic::Named(topic)) };
    };

    let latest = Arc::clone(&slot);
    let subscription = registry.subscribe(topic, move |data| current(&latest)(data));
    NotificationListener { slot, subscription }
}

/// Listen for every event.
pub fn use_notification_all<F>(ctx: &NotificationContext, callback: F) -> NotificationListener<EventCallback>
where
    F: Fn(&NotificationEvent) + Send + Sync + 'static,
{
    let initial: Arc<EventCallback> = Arc::new(callback);
    let slot = Arc::new(RwLock::new(initial));

    let Some(registry) = ctx.registry() else {
        tracing::warn!("hub: use_notification_all called without an active notification hub");
        return NotificationListener { slot, subscription: Subscription::inert(Topic::All) };
    };

    let latest = Arc::clone(&slot);
    let subscription = registry.subscribe_all(move |event| current(&latest)(event));
    NotificationListener { slot, subscription }
}

/// Snapshot of the connection status. Disconnected when no hub is active.
#[must_use]
pub fn use_notification_status(ctx: &NotificationContext) -> ConnectionStatus {
    ctx.status().unwrap_or_else(|| {
        tracing::warn!("hub: use_notification_status called without an active notification hub");
        ConnectionStatus::default()
    })
}

/// Change feed for connection indicators. `None` when no hub is active.
#[must_use]
pub fn watch_notification_status(ctx: &NotificationContext) -> Option<watch::Receiver<ConnectionState>> {
    let feed = ctx.state_changes();
    if feed.is_none() {
        tracing::warn!("hub: watch_notification_status called without an active notification hub");
    }
    feed
}

#[cfg(test)]
#[path = "hooks_test.rs"]
mod tests;
