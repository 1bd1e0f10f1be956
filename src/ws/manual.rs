//! An in-process transport whose connections are driven by the caller.
//!
//! Nothing touches the network: `ManualConnection::emit` stands in for the
//! remote side. Used by the test suite and handy for wiring UIs offline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;

use super::transport::{
    ConnectOptions, ConnectionHandle, EventDispatcher, TransportEvent, TransportEventKind,
    TransportFactory, TransportListener,
};

/// Disconnect reason reported when the client side closes a connection.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

#[derive(Default)]
struct ManualState {
    attempts: Vec<String>,
    connections: Vec<ManualConnection>,
    refuse: HashSet<String>,
    connect_on_create: bool,
}

/// Factory for [`ManualConnection`]s.
///
/// Clones share their bookkeeping, so a test can keep one clone and hand the
/// other to the code under test.
#[derive(Clone, Default)]
pub struct ManualTransport {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose connections report `Connect` the moment they are
    /// created, before anyone had a chance to listen.
    pub fn connecting_immediately() -> Self {
        let transport = Self::new();
        transport.lock().connect_on_create = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `create_connection` fail for this URL.
    pub fn refuse(&self, url: impl Into<String>) {
        self.lock().refuse.insert(url.into());
    }

    /// Every URL passed to `create_connection`, in call order, including
    /// refused ones.
    pub fn attempted_urls(&self) -> Vec<String> {
        self.lock().attempts.clone()
    }

    pub fn connections(&self) -> Vec<ManualConnection> {
        self.lock().connections.clone()
    }

    pub fn connection(&self, url: &str) -> Option<ManualConnection> {
        self.lock()
            .connections
            .iter()
            .find(|conn| conn.url() == url)
            .cloned()
    }
}

impl TransportFactory for ManualTransport {
    type Handle = ManualConnection;

    fn create_connection(
        &self,
        url: &str,
        options: ConnectOptions,
    ) -> Result<ManualConnection, TransportError> {
        let mut state = self.lock();
        state.attempts.push(url.to_string());

        if state.refuse.contains(url) {
            return Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: "refused by manual transport".to_string(),
            });
        }

        let connection = ManualConnection {
            inner: Arc::new(ManualInner {
                url: url.to_string(),
                options,
                dispatcher: EventDispatcher::new(),
                close_count: AtomicUsize::new(0),
            }),
        };
        if state.connect_on_create && options.auto_connect {
            connection.emit(TransportEvent::Connect);
        }
        state.connections.push(connection.clone());
        Ok(connection)
    }
}

struct ManualInner {
    url: String,
    options: ConnectOptions,
    dispatcher: EventDispatcher,
    close_count: AtomicUsize,
}

/// A connection that only does what the caller tells it to.
#[derive(Clone)]
pub struct ManualConnection {
    inner: Arc<ManualInner>,
}

impl ManualConnection {
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn options(&self) -> ConnectOptions {
        self.inner.options
    }

    /// Deliver `event` as if the transport had observed it.
    pub fn emit(&self, event: TransportEvent) {
        self.inner.dispatcher.dispatch(event);
    }

    /// How many times `close` was called on this connection
    pub fn close_count(&self) -> usize {
        self.inner.close_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// True when both values refer to the same underlying connection.
    pub fn same_connection(&self, other: &ManualConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl ConnectionHandle for ManualConnection {
    fn observe(&self, kinds: &[TransportEventKind], listener: TransportListener) {
        self.inner.dispatcher.register_all(kinds, listener);
    }

    fn close(&self) {
        // Like a real client, closing reports a disconnect the first time.
        if self.inner.close_count.fetch_add(1, Ordering::SeqCst) == 0 {
            self.emit(TransportEvent::Disconnect {
                reason: Some(CLIENT_DISCONNECT_REASON.to_string()),
            });
        }
    }
}
