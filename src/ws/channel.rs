//! Channel names, lookup keys and channel URL composition.

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::error::ConfigError;

/// Suffix appended to a channel name to form its lookup key.
pub const KEY_SUFFIX: &str = "Socket";

/// Suffix appended to a channel name to form its URL path segment.
pub const PATH_SUFFIX: &str = "-socket";

/// A validated channel name, e.g. `chat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Validate a single channel name.
    ///
    /// `index` is the position in the configured list and is only used for
    /// error reporting.
    pub fn parse(raw: &str, index: usize) -> Result<Self, ConfigError> {
        if raw.is_empty() {
            return Err(ConfigError::EmptyChannelName { index });
        }
        if raw
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            return Err(ConfigError::InvalidChannelName(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lookup key for this channel (`chat` -> `chatSocket`)
    pub fn key(&self) -> ChannelKey {
        ChannelKey(format!("{}{}", self.0, KEY_SUFFIX))
    }

    /// Full channel URL under `endpoint` (`chat` -> `{endpoint}/chat-socket`)
    pub fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}/{}{}", endpoint.as_str(), self.0, PATH_SUFFIX)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key under which a channel's connection is registered, e.g. `chatSocket`.
///
/// Keys only come from [`ChannelName::key`], so a key always names a channel
/// that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The channel name this key was derived from.
    pub fn channel_name(&self) -> &str {
        self.0.strip_suffix(KEY_SUFFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated base endpoint address, kept without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            address: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim().trim_end_matches('/');
        let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate an ordered list of channel names.
///
/// Fails on the first empty, malformed or duplicate name.
pub fn parse_channel_names<S: AsRef<str>>(raw: &[S]) -> Result<Vec<ChannelName>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NoChannels);
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(raw.len());
    for (index, name) in raw.iter().enumerate() {
        let name = ChannelName::parse(name.as_ref(), index)?;
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateChannelName(name.0));
        }
        names.push(name);
    }
    Ok(names)
}
