//! Error types for channel configuration and transports.

use thiserror::Error;

/// Invalid manager configuration. Raised at construction, before any
/// connection is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid endpoint address '{address}': {reason}")]
    InvalidEndpoint { address: String, reason: String },

    #[error("At least one channel name must be configured")]
    NoChannels,

    #[error("Channel name at position {index} is empty")]
    EmptyChannelName { index: usize },

    #[error("Channel name '{0}' contains characters not allowed in a URL path segment")]
    InvalidChannelName(String),

    #[error("Channel name '{0}' is configured more than once")]
    DuplicateChannelName(String),
}

/// Failure reported by a transport for a single channel.
///
/// These never escape the manager; they become an `Errored` state and an
/// error signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Invalid channel URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection is closed")]
    Closed,

    #[error("Gave up after {0} reconnect attempts")]
    ReconnectExhausted(u32),
}
