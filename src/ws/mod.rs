//! Per-channel real-time connections.
//!
//! This module provides:
//! - One transport connection per configured channel
//! - Lifecycle tracking for each connection
//! - Lifecycle signals on an explicit publish/subscribe bus
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              ChannelConnectionManager               │
//! │     (owns one connection per configured channel)    │
//! └─────────────────────────────────────────────────────┘
//!          │                │                 │
//!          ▼                ▼                 ▼
//!   ┌────────────┐   ┌────────────┐    ┌────────────┐
//!   │ chatSocket │   │ newsSocket │    │    ...     │
//!   │ /chat-sock │   │ /news-sock │    │            │
//!   └────────────┘   └────────────┘    └────────────┘
//!          │                │                 │
//!          └────────────────┼─────────────────┘
//!                           ▼  connect / disconnect / error
//!                ┌─────────────────────┐
//!                │      SignalBus      │
//!                └─────────────────────┘
//!                           │
//!          ┌────────────────┼─────────────────┐
//!          ▼                ▼                 ▼
//!   ┌────────────┐   ┌────────────┐    ┌────────────┐
//!   │ status     │   │ feature    │    │ logging    │
//!   │ banner     │   │ code       │    │            │
//!   └────────────┘   └────────────┘    └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = SignalBus::new();
//! let mut signals = bus.subscribe();
//! let config = ManagerConfig::new("http://localhost:8000", ["chat"]);
//! let manager = ChannelConnectionManager::new(&config, &WsTransport::new(), bus)?;
//!
//! let chat = manager.lookup("chatSocket").expect("chat is configured");
//! chat.send_text("hello")?;
//!
//! while let Ok(signal) = signals.recv().await {
//!     println!("{} {}", signal.event_name(), signal.payload_json());
//! }
//! ```

mod channel;
mod connection;
mod manager;
pub mod manual;
mod signal;
mod status;
mod transport;

pub use channel::{parse_channel_names, ChannelKey, ChannelName, Endpoint};
pub use connection::{to_ws_url, ReconnectConfig, WsConnection, WsTransport};
pub use manager::{ChannelConnectionManager, ConnectionState};
pub use signal::{
    LifecycleSignal, SignalBus, SignalDetail, SignalKind, SOCKET_CONNECT, SOCKET_DISCONNECT,
    SOCKET_ERROR,
};
pub use status::{ChannelStatus, ConnectivityStatus};
pub use transport::{
    ConnectOptions, ConnectionHandle, EventDispatcher, TransportEvent, TransportEventKind,
    TransportFactory, TransportListener,
};
