//! Plain WebSocket transport with auto-reconnect.
//!
//! Connections speak bare RFC 6455 text frames to the channel URL, with the
//! scheme switched to `ws`/`wss`. There is no socket.io or engine.io
//! handshake, so the backend must serve each channel as a plain WebSocket
//! route (`/chat-socket`). Backends that expose channels as socket.io
//! namespaces need a different [`TransportFactory`].
//!
//! This module provides the shared types and conditionally includes
//! the platform-specific connection loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use serde::Serialize;
use tokio::sync::watch;
use url::Url;

use crate::error::TransportError;
use crate::ws::transport::{
    ConnectOptions, ConnectionHandle, EventDispatcher, TransportEventKind, TransportFactory,
    TransportListener,
};

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
    /// How long a single attempt may take before it counts as failed
    pub connect_timeout_ms: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 1.5,
            connect_timeout_ms: 20000,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(exponent);
        if !delay.is_finite() {
            return self.max_delay_ms;
        }
        (delay as u32).min(self.max_delay_ms)
    }

    /// Whether another attempt is allowed after `attempt` failed ones
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

/// Map an `http(s)` channel URL onto the matching `ws(s)` scheme.
pub fn to_ws_url(url: &str) -> Result<String, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let mut parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    let scheme = match parsed.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid("unsupported scheme")),
    };
    parsed
        .set_scheme(scheme)
        .map_err(|_| invalid("cannot switch scheme"))?;
    Ok(parsed.to_string())
}

/// Transport factory producing plain WebSocket [`WsConnection`]s.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    reconnect: ReconnectConfig,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconnect(reconnect: ReconnectConfig) -> Self {
        Self { reconnect }
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect
    }
}

impl TransportFactory for WsTransport {
    type Handle = WsConnection;

    fn create_connection(
        &self,
        url: &str,
        options: ConnectOptions,
    ) -> Result<WsConnection, TransportError> {
        let ws_url = to_ws_url(url)?;
        let connection = WsConnection::new(ws_url, self.reconnect.clone());
        if options.auto_connect {
            connection.connect()?;
        }
        Ok(connection)
    }
}

/// State shared between a [`WsConnection`] and its connection loop.
pub(crate) struct Shared {
    pub(crate) url: String,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) shutdown: watch::Sender<bool>,
}

/// A WebSocket connection for one channel.
///
/// Clones refer to the same connection. The connection loop keeps
/// reconnecting until [`close`](ConnectionHandle::close) is called, the last
/// clone is dropped, or the reconnect budget runs out.
#[derive(Clone)]
pub struct WsConnection {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Arc<Shared>,
    outbound: UnboundedSender<String>,
    /// Taken by the connection loop when it starts
    pending_outbound: Mutex<Option<UnboundedReceiver<String>>>,
    closed: AtomicBool,
    reconnect: ReconnectConfig,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

impl WsConnection {
    fn new(url: String, reconnect: ReconnectConfig) -> Self {
        let (outbound, receiver) = unbounded();
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    url,
                    dispatcher: EventDispatcher::new(),
                    shutdown,
                }),
                outbound,
                pending_outbound: Mutex::new(Some(receiver)),
                closed: AtomicBool::new(false),
                reconnect,
            }),
        }
    }

    /// Start the connection loop. Does nothing if it is already running.
    pub fn connect(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let receiver = self
            .inner
            .pending_outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match receiver {
            Some(receiver) => start_connection_loop(
                self.inner.shared.clone(),
                receiver,
                self.inner.reconnect.clone(),
            ),
            None => Ok(()),
        }
    }

    /// The `ws://` or `wss://` URL this connection dials
    pub fn url(&self) -> &str {
        &self.inner.shared.url
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Queue a text frame.
    ///
    /// Frames queued while disconnected are sent once the connection is up.
    /// A frame whose write fails is kept and sent first on the next
    /// connection; frames still queued when the connection is closed are
    /// dropped.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inner
            .outbound
            .unbounded_send(text.into())
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    /// Serialize `value` as JSON and queue it as a text frame.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string(value).map_err(|e| TransportError::Send(e.to_string()))?;
        self.send_text(json)
    }
}

impl ConnectionHandle for WsConnection {
    fn observe(&self, kinds: &[TransportEventKind], listener: TransportListener) {
        self.inner.shared.dispatcher.register_all(kinds, listener);
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        crate::log_debug!("Closing WebSocket to {}", self.url());
        self.inner.shared.shutdown.send_replace(true);
        self.inner.outbound.close_channel();
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
use connection_wasm::start_connection_loop;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
use connection_native::start_connection_loop;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 1500);
        assert_eq!(config.delay_for_attempt(2), 2250);
        assert_eq!(config.delay_for_attempt(10), 5000);
        assert_eq!(config.delay_for_attempt(u32::MAX), 5000);
    }

    #[test]
    fn test_retry_budget() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.allows_retry(1_000));

        let limited = ReconnectConfig {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(limited.allows_retry(2));
        assert!(!limited.allows_retry(3));
    }

    #[test]
    fn test_ws_url_mapping() {
        assert_eq!(
            to_ws_url("http://localhost:8000/chat-socket").unwrap(),
            "ws://localhost:8000/chat-socket"
        );
        assert_eq!(
            to_ws_url("https://api.example.com/chat-socket").unwrap(),
            "wss://api.example.com/chat-socket"
        );
        assert_eq!(
            to_ws_url("wss://api.example.com/chat-socket").unwrap(),
            "wss://api.example.com/chat-socket"
        );
        assert!(matches!(
            to_ws_url("ftp://example.com/chat-socket"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_closed_connection_rejects_sends() {
        let connection = WsConnection::new(
            "ws://localhost:8000/chat-socket".to_string(),
            ReconnectConfig::default(),
        );
        assert!(connection.send_text("queued").is_ok());

        connection.close();
        connection.close();
        assert!(connection.is_closed());
        assert_eq!(connection.send_text("late"), Err(TransportError::Closed));
        assert_eq!(connection.connect(), Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_error() {
        use std::sync::mpsc;
        use std::time::Duration;

        use crate::ws::transport::TransportEvent;

        let transport = WsTransport::with_reconnect(ReconnectConfig {
            max_attempts: 1,
            initial_delay_ms: 10,
            connect_timeout_ms: 2000,
            ..Default::default()
        });
        // Port 9 (discard) on localhost is closed in test environments.
        let connection = transport
            .create_connection("http://127.0.0.1:9/chat-socket", ConnectOptions::default())
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        connection.on(
            TransportEventKind::Error,
            Arc::new(move |event: &TransportEvent| {
                let _ = tx.lock().unwrap().send(event.clone());
            }),
        );

        let event = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(10)))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, TransportEvent::Error(TransportError::Connect(_))));
        connection.close();
    }
}
