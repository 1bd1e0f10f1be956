//! Manager configuration from environment variables.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ws::{parse_channel_names, ChannelName, Endpoint};

/// Environment variable holding the backend base URL
pub const API_URL_ENV: &str = "CHANNEL_SOCKETS_API_URL";
/// Environment variable holding the comma-separated channel names
pub const CHANNELS_ENV: &str = "CHANNEL_SOCKETS_CHANNELS";

pub const DEFAULT_API_URL: &str = "http://0.0.0.0:8000";
pub const DEFAULT_CHANNELS: &[&str] = &["chat"];

/// Raw configuration as supplied by the host application.
///
/// Nothing is checked until [`ManagerConfig::validate`] runs, which the
/// manager does before opening any connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    pub endpoint_address: String,
    pub channel_names: Vec<String>,
}

/// A configuration that passed validation.
///
/// Only [`ManagerConfig::validate`] builds one, so the channel list is
/// always non-empty and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    endpoint: Endpoint,
    channels: Vec<ChannelName>,
}

impl ResolvedConfig {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn channels(&self) -> &[ChannelName] {
        &self.channels
    }

    pub(crate) fn into_parts(self) -> (Endpoint, Vec<ChannelName>) {
        (self.endpoint, self.channels)
    }
}

impl ManagerConfig {
    pub fn new<S: Into<String>>(
        endpoint_address: impl Into<String>,
        channel_names: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            endpoint_address: endpoint_address.into(),
            channel_names: channel_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// Environment variables:
    /// - `CHANNEL_SOCKETS_API_URL`: backend base URL (default: "http://0.0.0.0:8000")
    /// - `CHANNEL_SOCKETS_CHANNELS`: comma-separated channel names (default: "chat")
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ManagerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint_address = lookup(API_URL_ENV).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let channel_names = match lookup(CHANNELS_ENV) {
            Some(raw) => split_channel_list(&raw),
            None => DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect(),
        };

        Self {
            endpoint_address,
            channel_names,
        }
    }

    pub fn validate(&self) -> Result<ResolvedConfig, ConfigError> {
        let endpoint = Endpoint::parse(&self.endpoint_address)?;
        let channels = parse_channel_names(self.channel_names.as_slice())?;
        Ok(ResolvedConfig { endpoint, channels })
    }
}

/// Split `"chat, news"` into names. Empty entries are kept so validation can
/// reject them instead of silently skipping a typo.
fn split_channel_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|name| name.trim().to_string()).collect()
}
