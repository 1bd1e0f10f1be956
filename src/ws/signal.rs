//! Lifecycle signals and the bus they are published on.
//!
//! Consumers that want to react to connectivity (a status banner, a retry
//! button) subscribe to a [`SignalBus`] and never need a reference to the
//! manager itself.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::channel::ChannelKey;

/// Event name published when a channel connects.
pub const SOCKET_CONNECT: &str = "socket-connect";
/// Event name published when a channel loses its connection.
pub const SOCKET_DISCONNECT: &str = "socket-disconnect";
/// Event name published when a channel's transport reports an error.
pub const SOCKET_ERROR: &str = "socket-error";

const DEFAULT_CAPACITY: usize = 256;

/// Which lifecycle transition a signal reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Connect,
    Disconnect,
    Error,
}

impl SignalKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalKind::Connect => SOCKET_CONNECT,
            SignalKind::Disconnect => SOCKET_DISCONNECT,
            SignalKind::Error => SOCKET_ERROR,
        }
    }
}

/// A lifecycle transition for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSignal {
    pub channel_key: ChannelKey,
    pub kind: SignalKind,
    /// Error or disconnect reason, when the transport gave one
    pub detail: Option<String>,
}

/// Wire shape of a signal's detail payload: `{ "channelKey": "chatSocket" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDetail {
    pub channel_key: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl LifecycleSignal {
    pub fn connect(channel_key: ChannelKey) -> Self {
        Self {
            channel_key,
            kind: SignalKind::Connect,
            detail: None,
        }
    }

    pub fn disconnect(channel_key: ChannelKey, reason: Option<String>) -> Self {
        Self {
            channel_key,
            kind: SignalKind::Disconnect,
            detail: reason,
        }
    }

    pub fn error(channel_key: ChannelKey, error: impl Into<String>) -> Self {
        Self {
            channel_key,
            kind: SignalKind::Error,
            detail: Some(error.into()),
        }
    }

    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }

    /// Payload in the form consumers of the named events expect.
    ///
    /// Only error signals carry their detail; a disconnect reason stays
    /// on the struct.
    pub fn payload(&self) -> SignalDetail {
        SignalDetail {
            channel_key: self.channel_key.as_str().to_string(),
            error: match self.kind {
                SignalKind::Error => self.detail.clone(),
                _ => None,
            },
        }
    }

    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::to_value(self.payload()).unwrap_or(serde_json::Value::Null)
    }
}

/// Publish/subscribe bus for lifecycle signals.
///
/// Cloning a bus yields another handle to the same channel. Publishing with
/// no subscribers is not an error; the signal is simply dropped.
#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<LifecycleSignal>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus that buffers up to `capacity` signals per slow subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every signal published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.sender.subscribe()
    }

    /// Publish a signal, returning how many subscribers received it.
    pub fn publish(&self, signal: LifecycleSignal) -> usize {
        crate::log_debug!(
            "{} {}",
            signal.event_name(),
            signal.payload_json()
        );
        self.sender.send(signal).unwrap_or(0)
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
