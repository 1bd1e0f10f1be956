//! Channel Sockets - per-channel real-time connection manager
//!
//! Opens one connection per configured channel against a backend endpoint,
//! makes each connection discoverable by key, and reports connect,
//! disconnect and error transitions as lifecycle signals.

pub mod config;
pub mod error;
pub mod logging;
pub mod ws;

pub use config::{ManagerConfig, ResolvedConfig};
pub use error::{ConfigError, TransportError};
pub use ws::{
    ChannelConnectionManager, ChannelKey, ChannelName, ConnectionHandle, ConnectionState,
    ConnectivityStatus, LifecycleSignal, SignalBus, SignalKind, TransportFactory, WsConnection,
    WsTransport,
};
