//! The notification hub: one push channel, one registry, one session.
//!
//! DESIGN
//! ======
//! The application root constructs exactly one `NotificationHub` and keeps
//! it alive for as long as notifications should flow. Features never see the
//! hub itself; they get a [`NotificationContext`], a cloneable weak handle.
//! A context never keeps the hub alive, so dropping the hub shuts the push
//! channel down no matter how many features still hold contexts.
//!
//! Frames flow transport -> `HubSink` -> registry. The sink runs inside the
//! connection task, so subscriber callbacks execute there, one frame at a
//! time.

use std::sync::{Arc, Weak};

use tokio::sync::watch;

use crate::config::HubConfig;
use crate::event::NotificationEvent;
use crate::registry::{DispatchReport, SubscriberRegistry, Subscription};
use crate::session::{MemorySessionStore, SessionStore, get_or_create_session_id};
use crate::transport::{
    ConnectionState, ConnectionStatus, HttpConnector, PushConnector, TransportError, TransportManager,
    TransportSink,
};

// =============================================================================
// SINK
// =============================================================================

struct HubSink {
    registry: SubscriberRegistry,
}

impl TransportSink for HubSink {
    fn on_open(&self, session_id: &str) {
        tracing::debug!(%session_id, "hub: push channel open");
    }

    fn on_message(&self, event: NotificationEvent) {
        let report = self.registry.dispatch(&event);
        tracing::trace!(
            topic = event.payload_type().unwrap_or(&event.event_type),
            delivered = report.delivered,
            failed = report.failed,
            "hub: notification dispatched"
        );
    }

    fn on_error(&self, error: &TransportError) {
        tracing::debug!(error = %error, "hub: push channel lost");
    }
}

// =============================================================================
// HUB
// =============================================================================

struct HubInner {
    config: HubConfig,
    registry: SubscriberRegistry,
    transport: TransportManager,
    sessions: Arc<dyn SessionStore>,
}

impl HubInner {
    fn open(&self) -> String {
        let session_id = get_or_create_session_id(self.sessions.as_ref());
        self.transport.open(&session_id, self.config.timeout_ms);
        session_id
    }
}

/// Owner of the push channel and the subscriber registry.
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    #[must_use]
    pub fn new(config: HubConfig, connector: Arc<dyn PushConnector>, sessions: Arc<dyn SessionStore>) -> Self {
        let registry = SubscriberRegistry::new();
        let sink = Arc::new(HubSink { registry: registry.clone() });
        let transport = TransportManager::new(config.base_url.clone(), config.reconnect_delay, connector, sink);
        Self { inner: Arc::new(HubInner { config, registry, transport, sessions }) }
    }

    /// Hub over HTTP with a process-lifetime session store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: HubConfig) -> Result<Self, TransportError> {
        let connector = Arc::new(HttpConnector::new(config.connect_timeout)?);
        Ok(Self::new(config, connector, Arc::new(MemorySessionStore::new())))
    }

    /// Resolve the session id and open the push channel. Returns the id.
    ///
    /// No-op on the channel if it is already connecting or open.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> String {
        let session_id = self.inner.open();
        tracing::info!(%session_id, base_url = %self.inner.config.base_url, "hub: started");
        session_id
    }

    /// Re-open the push channel with the cached session id.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime.
    pub fn reconnect(&self) -> String {
        self.inner.open()
    }

    /// Close the push channel. Subscriptions stay registered.
    pub fn close(&self) {
        self.inner.transport.close();
    }

    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe_all(callback)
    }

    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(topic, callback)
    }

    /// Deliver an event locally, as if it had arrived on the push channel.
    pub fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        self.inner.registry.dispatch(event)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.transport.status()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    #[must_use]
    pub fn status_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.transport.subscribe_state()
    }

    /// Session id of the current or last channel.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.transport.state().session_id
    }

    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Handle for features. Does not keep the hub alive.
    #[must_use]
    pub fn context(&self) -> NotificationContext {
        NotificationContext { hub: Arc::downgrade(&self.inner) }
    }
}

impl Drop for NotificationHub {
    fn drop(&mut self) {
        self.inner.transport.close();
        tracing::debug!("hub: dropped");
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Weak handle to a hub, injected into features.
#[derive(Clone, Default)]
pub struct NotificationContext {
    hub: Weak<HubInner>,
}

impl NotificationContext {
    /// A context that was never attached to a hub.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// True while the hub this context came from is alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.hub.strong_count() > 0
    }

    pub(crate) fn registry(&self) -> Option<SubscriberRegistry> {
        self.hub.upgrade().map(|hub| hub.registry.clone())
    }

    pub(crate) fn status(&self) -> Option<ConnectionStatus> {
        self.hub.upgrade().map(|hub| hub.transport.status())
    }

    pub(crate) fn state_changes(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.hub.upgrade().map(|hub| hub.transport.subscribe_state())
    }
}

impl std::fmt::Debug for NotificationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationContext")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
