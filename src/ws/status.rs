//! Connectivity view built purely from lifecycle signals.
//!
//! This is what a status banner needs: it subscribes to the signal bus and
//! never holds a reference to the manager.

use std::collections::BTreeMap;

use super::channel::ChannelKey;
use super::signal::{LifecycleSignal, SignalKind};

/// Last known status of one channel, as seen through its signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// No signal seen yet
    Pending,
    Online,
    Offline,
    Failing { last_error: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConnectivityStatus {
    channels: BTreeMap<ChannelKey, ChannelStatus>,
}

impl ConnectivityStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `keys` so they count as not online until they connect.
    pub fn track<'a>(&mut self, keys: impl IntoIterator<Item = &'a ChannelKey>) {
        for key in keys {
            self.channels
                .entry(key.clone())
                .or_insert(ChannelStatus::Pending);
        }
    }

    pub fn apply(&mut self, signal: &LifecycleSignal) {
        let status = match signal.kind {
            SignalKind::Connect => ChannelStatus::Online,
            SignalKind::Disconnect => ChannelStatus::Offline,
            SignalKind::Error => ChannelStatus::Failing {
                last_error: signal.detail.clone().unwrap_or_default(),
            },
        };
        self.channels.insert(signal.channel_key.clone(), status);
    }

    pub fn status(&self, key: &ChannelKey) -> Option<&ChannelStatus> {
        self.channels.get(key)
    }

    pub fn online_count(&self) -> usize {
        self.channels
            .values()
            .filter(|status| **status == ChannelStatus::Online)
            .count()
    }

    /// True when at least one channel is tracked and all of them are online.
    pub fn is_online(&self) -> bool {
        !self.channels.is_empty() && self.online_count() == self.channels.len()
    }

    /// Channels that are tracked but not online.
    pub fn offline(&self) -> Vec<&ChannelKey> {
        self.channels
            .iter()
            .filter(|(_, status)| **status != ChannelStatus::Online)
            .map(|(key, _)| key)
            .collect()
    }

    /// e.g. `"1/2 channels online"`
    pub fn summary(&self) -> String {
        format!(
            "{}/{} channels online",
            self.online_count(),
            self.channels.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::channel::ChannelName;

    fn key(name: &str) -> ChannelKey {
        ChannelName::parse(name, 0).unwrap().key()
    }

    #[test]
    fn test_tracks_until_every_channel_connects() {
        let mut status = ConnectivityStatus::new();
        let keys = [key("chat"), key("news")];
        status.track(&keys);
        assert!(!status.is_online());
        assert_eq!(status.status(&key("chat")), Some(&ChannelStatus::Pending));

        status.apply(&LifecycleSignal::connect(key("chat")));
        assert_eq!(status.summary(), "1/2 channels online");
        assert_eq!(status.offline(), vec![&key("news")]);

        status.apply(&LifecycleSignal::connect(key("news")));
        assert!(status.is_online());
    }

    #[test]
    fn test_disconnect_and_error() {
        let mut status = ConnectivityStatus::new();
        status.apply(&LifecycleSignal::connect(key("chat")));
        status.apply(&LifecycleSignal::disconnect(key("chat"), None));
        assert_eq!(status.status(&key("chat")), Some(&ChannelStatus::Offline));

        status.apply(&LifecycleSignal::error(key("chat"), "timeout"));
        assert_eq!(
            status.status(&key("chat")),
            Some(&ChannelStatus::Failing {
                last_error: "timeout".to_string()
            })
        );
        assert!(!status.is_online());
    }

    #[test]
    fn test_empty_is_not_online() {
        assert!(!ConnectivityStatus::new().is_online());
    }
}
