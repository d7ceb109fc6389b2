//! Push-channel transport: one SSE connection per session, with reconnect.
//!
//! ARCHITECTURE
//! ============
//! `TransportManager::open` spawns a connection task that owns the byte
//! stream. The task connects through a [`PushConnector`], decodes SSE
//! frames, and hands each message to a [`TransportSink`]. Any failure
//! (refused connect, bad status, read error, or the server ending the
//! stream, which is also how an idle timeout shows up) moves the channel to
//! `Reconnecting`, notifies the sink, sleeps for the fixed reconnect delay,
//! and loops back to `Connecting` with the same session id.
//!
//! ```text
//! Idle -> Connecting -> Open -> Reconnecting -> Connecting -> ...
//!             |                      ^
//!             +---- connect error ---+
//! any state -> Closed   (close() only)
//! ```
//!
//! Connection state is published through one `watch` channel; nothing else
//! tracks connectivity.
//!
//! RECONNECT
//! =========
//! The delay is fixed and retries never stop: a dead backend gets one
//! request per interval.
//!
//! Each `open` bumps a generation counter and `close` bumps it again. A task
//! whose generation is stale stops publishing state and delivering events,
//! so an aborted task can never flip `Closed` back to `Reconnecting`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::event::NotificationEvent;
use crate::sse::SseDecoder;

/// Media type of the push channel.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Raw body chunks of an open push channel.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push endpoint returned HTTP {0}")]
    Status(u16),
    #[error("push endpoint returned content type {0:?}, expected text/event-stream")]
    UnexpectedContentType(String),
    #[error("push stream ended")]
    StreamEnded,
    #[error("push stream read failed: {0}")]
    Read(String),
}

// =============================================================================
// CONNECTION STATE
// =============================================================================

/// Lifecycle of the push channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Never opened.
    #[default]
    Idle,
    /// Connection attempt in flight.
    Connecting,
    /// Stream is open and delivering frames.
    Open,
    /// Last attempt failed; waiting for the reconnect timer.
    Reconnecting,
    /// Explicitly closed. Only `open` leaves this state.
    Closed,
}

/// Process-wide connection state, published by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Session id of the current (or last) channel.
    pub session_id: Option<String>,
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }
}

/// Read-only snapshot handed to consumers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub session_id: Option<String>,
}

impl From<&ConnectionState> for ConnectionStatus {
    fn from(state: &ConnectionState) -> Self {
        Self { connected: state.is_connected(), session_id: state.session_id.clone() }
    }
}

// =============================================================================
// SEAMS
// =============================================================================

/// Opens the raw push stream. The HTTP implementation is [`HttpConnector`].
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<ByteStream, TransportError>;
}

/// Receives transport events. Called from the connection task, one frame
/// at a time.
pub trait TransportSink: Send + Sync {
    fn on_open(&self, _session_id: &str) {}
    fn on_message(&self, event: NotificationEvent);
    fn on_error(&self, _error: &TransportError) {}
}

/// Build `{base}/subscribe/{session_id}[?timeout={ms}]`.
#[must_use]
pub fn subscribe_url(base_url: &str, session_id: &str, timeout_ms: Option<u64>) -> String {
    let base = base_url.trim_end_matches('/');
    match timeout_ms.filter(|ms| *ms > 0) {
        Some(ms) => format!("{base}/subscribe/{session_id}?timeout={ms}"),
        None => format!("{base}/subscribe/{session_id}"),
    }
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(EVENT_STREAM_CONTENT_TYPE))
}

// =============================================================================
// HTTP CONNECTOR
// =============================================================================

/// `reqwest`-backed push connector.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    /// Build a connector with the given TCP connect timeout. No overall
    /// request timeout is set since the response body never ends on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushConnector for HttpConnector {
    async fn connect(&self, url: &str) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if !is_event_stream(&content_type) {
            return Err(TransportError::UnexpectedContentType(content_type));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(stream.boxed())
    }
}

// =============================================================================
// TRANSPORT MANAGER
// =============================================================================

struct Shared {
    connector: Arc<dyn PushConnector>,
    sink: Arc<dyn TransportSink>,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    generation: Mutex<u64>,
}

impl Shared {
    fn generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation() == generation
    }

    /// Start a new generation in `Connecting`.
    fn begin(&self, session_id: &str) -> u64 {
        let mut current = self.generation();
        *current += 1;
        self.state.send_replace(ConnectionState {
            phase: ConnectionPhase::Connecting,
            session_id: Some(session_id.to_owned()),
        });
        *current
    }

    /// Invalidate every running generation and mark the channel closed.
    fn end(&self) {
        let mut current = self.generation();
        *current += 1;
        self.state.send_modify(|state| state.phase = ConnectionPhase::Closed);
    }

    /// Publish `phase` if `generation` is still current.
    fn set_phase(&self, generation: u64, phase: ConnectionPhase) -> bool {
        let current = self.generation();
        if *current != generation {
            return false;
        }
        self.state.send_if_modified(|state| {
            if state.phase == phase {
                return false;
            }
            state.phase = phase;
            true
        });
        true
    }
}

struct Channel {
    session_id: String,
    task: JoinHandle<()>,
}

/// Owns the single push channel of a hub.
pub struct TransportManager {
    base_url: String,
    shared: Arc<Shared>,
    channel: Mutex<Option<Channel>>,
}

impl TransportManager {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        reconnect_delay: Duration,
        connector: Arc<dyn PushConnector>,
        sink: Arc<dyn TransportSink>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            base_url: base_url.into(),
            shared: Arc::new(Shared {
                connector,
                sink,
                reconnect_delay,
                state,
                generation: Mutex::new(0),
            }),
            channel: Mutex::new(None),
        }
    }

    fn channel(&self) -> std::sync::MutexGuard<'_, Option<Channel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the push channel for `session_id`.
    ///
    /// No-op while a channel is connecting or open. While the channel waits
    /// for its reconnect timer, the timer is cancelled and a new attempt
    /// starts right away.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime; the connection task is spawned
    /// with `tokio::spawn`.
    pub fn open(&self, session_id: &str, timeout_ms: Option<u64>) {
        let mut channel = self.channel();
        if let Some(active) = channel.as_ref() {
            let phase = self.shared.state.borrow().phase;
            let live = matches!(phase, ConnectionPhase::Connecting | ConnectionPhase::Open);
            if live && !active.task.is_finished() {
                tracing::debug!(session_id = %active.session_id, ?phase, "sse: channel already active, open ignored");
                return;
            }
        }
        if let Some(stale) = channel.take() {
            stale.task.abort();
        }

        let url = subscribe_url(&self.base_url, session_id, timeout_ms);
        let generation = self.shared.begin(session_id);
        tracing::info!(%session_id, %url, "sse: opening push channel");

        let task = tokio::spawn(run_channel(
            Arc::clone(&self.shared),
            generation,
            url,
            session_id.to_owned(),
        ));
        *channel = Some(Channel { session_id: session_id.to_owned(), task });
    }

    /// Tear the channel down. Cancels any pending reconnect and never
    /// schedules a new one.
    pub fn close(&self) {
        let channel = self.channel().take();
        self.shared.end();
        if let Some(channel) = channel {
            channel.task.abort();
            tracing::info!(session_id = %channel.session_id, "sse: push channel closed");
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from(&*self.shared.state.borrow())
    }

    /// Change feed for the connection state.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.shared.reconnect_delay
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        if let Some(channel) = self.channel().take() {
            channel.task.abort();
        }
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

enum ChannelEnd {
    /// A newer `open` or a `close` replaced this task.
    Superseded,
    Failed(TransportError),
}

async fn run_channel(shared: Arc<Shared>, generation: u64, url: String, session_id: String) {
    loop {
        if !shared.set_phase(generation, ConnectionPhase::Connecting) {
            return;
        }

        let error = match shared.connector.connect(&url).await {
            Ok(stream) => {
                if !shared.set_phase(generation, ConnectionPhase::Open) {
                    return;
                }
                tracing::info!(%session_id, "sse: connection established");
                shared.sink.on_open(&session_id);
                match pump_frames(&shared, generation, stream).await {
                    ChannelEnd::Superseded => return,
                    ChannelEnd::Failed(error) => error,
                }
            }
            Err(error) => error,
        };

        if !shared.set_phase(generation, ConnectionPhase::Reconnecting) {
            return;
        }
        tracing::warn!(
            %session_id,
            error = %error,
            delay_ms = u64::try_from(shared.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "sse: connection error, reconnect scheduled"
        );
        shared.sink.on_error(&error);

        tokio::time::sleep(shared.reconnect_delay).await;
    }
}

async fn pump_frames(shared: &Shared, generation: u64, mut stream: ByteStream) -> ChannelEnd {
    let mut decoder = SseDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => return ChannelEnd::Failed(error),
        };
        for frame in decoder.feed(&chunk) {
            if !shared.is_current(generation) {
                return ChannelEnd::Superseded;
            }
            if !frame.is_message() {
                tracing::debug!(event = ?frame.event, "sse: skipping named event");
                continue;
            }
            shared.sink.on_message(NotificationEvent::from_frame_body(&frame.data));
        }
    }
    decoder.finish();
    ChannelEnd::Failed(TransportError::StreamEnded)
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
