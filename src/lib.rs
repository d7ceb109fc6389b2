//! Real-time notification fan-out for the catalog/borrowing/registration client.
//!
//! One server-push (SSE) channel per session, multiplexed into many
//! independent subscriptions. The application root owns a
//! [`NotificationHub`]; features receive a [`NotificationContext`] and use
//! the functions in [`hooks`].

pub mod api;
pub mod config;
pub mod event;
pub mod hooks;
pub mod hub;
pub mod registry;
pub mod session;
pub mod sse;
pub mod transport;

pub use api::{ApiError, NotificationApi, NotificationResponse, RemoteConnectionStatus, SendNotificationRequest};
pub use config::{ConfigError, HubConfig};
pub use event::{MESSAGE_EVENT_TYPE, NotificationEvent};
pub use hooks::{
    NotificationListener, use_notification, use_notification_all, use_notification_status, watch_notification_status,
};
pub use hub::{NotificationContext, NotificationHub};
pub use registry::{DispatchReport, SubscriberRegistry, Subscription, Topic};
pub use session::{MemorySessionStore, SessionStore, get_or_create_session_id};
pub use transport::{
    ConnectionPhase, ConnectionState, ConnectionStatus, HttpConnector, PushConnector, TransportError,
    TransportManager, TransportSink,
};
