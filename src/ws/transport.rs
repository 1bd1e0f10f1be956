//! The seam between the manager and whatever library actually speaks the
//! wire protocol.
//!
//! A [`TransportFactory`] turns a channel URL into a [`ConnectionHandle`] that
//! starts connecting on its own. Handles report what happens to them through
//! listeners registered per [`TransportEventKind`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;

/// Events buffered per handle while no listener of their kind is registered.
const MAX_PENDING_EVENTS: usize = 64;

/// Options passed to the factory for every channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Start connecting as soon as the handle is created
    pub auto_connect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self { auto_connect: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    Connecting,
    Connect,
    Disconnect,
    Error,
    Message,
}

/// Something a transport observed on one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt started (0 for the first attempt)
    Connecting { attempt: u32 },
    Connect,
    Disconnect { reason: Option<String> },
    Error(TransportError),
    /// A text frame from the remote side
    Message(String),
}

impl TransportEvent {
    pub fn kind(&self) -> TransportEventKind {
        match self {
            TransportEvent::Connecting { .. } => TransportEventKind::Connecting,
            TransportEvent::Connect => TransportEventKind::Connect,
            TransportEvent::Disconnect { .. } => TransportEventKind::Disconnect,
            TransportEvent::Error(_) => TransportEventKind::Error,
            TransportEvent::Message(_) => TransportEventKind::Message,
        }
    }
}

pub type TransportListener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// One transport-level connection for a single channel.
pub trait ConnectionHandle {
    /// Register one `listener` for every event whose kind is in `kinds`.
    ///
    /// Events of those kinds the handle saw before any listener was
    /// registered are replayed to `listener` in the order they happened,
    /// across kinds.
    fn observe(&self, kinds: &[TransportEventKind], listener: TransportListener);

    /// Register `listener` for every event of `kind`.
    fn on(&self, kind: TransportEventKind, listener: TransportListener) {
        self.observe(&[kind], listener);
    }

    /// Issue a transport-level disconnect. Calling it again has no effect.
    fn close(&self);
}

/// Creates connections. Connecting is a side effect of creation when
/// `options.auto_connect` is set.
pub trait TransportFactory {
    type Handle: ConnectionHandle;

    fn create_connection(
        &self,
        url: &str,
        options: ConnectOptions,
    ) -> Result<Self::Handle, TransportError>;
}

#[derive(Default)]
struct DispatchState {
    listeners: HashMap<TransportEventKind, Vec<TransportListener>>,
    pending: VecDeque<TransportEvent>,
}

/// Listener bookkeeping shared by the bundled transports.
///
/// Delivery is serialized: a listener never runs concurrently with another
/// listener of the same dispatcher, and replayed events are delivered before
/// any event dispatched after registration. Listeners must not dispatch on
/// the dispatcher that is calling them.
#[derive(Default)]
pub struct EventDispatcher {
    state: Mutex<DispatchState>,
    delivery: Mutex<()>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, kind: TransportEventKind, listener: TransportListener) {
        self.register_all(&[kind], listener);
    }

    /// Register `listener` under each of `kinds` and replay the buffered
    /// events of those kinds in arrival order.
    pub fn register_all(&self, kinds: &[TransportEventKind], listener: TransportListener) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let replay: Vec<TransportEvent> = {
            let mut state = self.state();
            for kind in kinds {
                state
                    .listeners
                    .entry(*kind)
                    .or_default()
                    .push(listener.clone());
            }

            let (matching, rest): (VecDeque<_>, VecDeque<_>) = state
                .pending
                .drain(..)
                .partition(|event| kinds.contains(&event.kind()));
            state.pending = rest;
            matching.into_iter().collect()
        };

        for event in &replay {
            listener(event);
        }
    }

    pub fn dispatch(&self, event: TransportEvent) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let listeners = {
            let mut state = self.state();
            match state.listeners.get(&event.kind()) {
                Some(listeners) if !listeners.is_empty() => listeners.clone(),
                _ => {
                    if state.pending.len() >= MAX_PENDING_EVENTS {
                        state.pending.pop_front();
                    }
                    state.pending.push_back(event);
                    return;
                }
            }
        };

        for listener in &listeners {
            listener(&event);
        }
    }

    /// Drop all listeners and buffered events.
    pub fn clear(&self) {
        let mut state = self.state();
        state.listeners.clear();
        state.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }
}
