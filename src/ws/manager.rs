//! One connection per configured channel, with lifecycle tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{ManagerConfig, ResolvedConfig};
use crate::error::ConfigError;

use super::channel::{ChannelKey, ChannelName, Endpoint};
use super::signal::{LifecycleSignal, SignalBus};
use super::transport::{
    ConnectOptions, ConnectionHandle, TransportEvent, TransportEventKind, TransportFactory,
};

/// Lifecycle state of one channel's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Transport events a channel observer subscribes to.
const OBSERVED_EVENTS: [TransportEventKind; 4] = [
    TransportEventKind::Connecting,
    TransportEventKind::Connect,
    TransportEventKind::Disconnect,
    TransportEventKind::Error,
];

/// Applies transport events for one channel to its state and the signal bus.
///
/// This is the only code that writes a channel's state.
struct ChannelObserver {
    key: ChannelKey,
    state: Mutex<ConnectionState>,
    bus: SignalBus,
    closing: Arc<AtomicBool>,
}

impl ChannelObserver {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: &TransportEvent) {
        let name = self.key.channel_name();
        if self.closing.load(Ordering::Acquire) {
            crate::log_debug!("{} socket: ignoring {:?} during teardown", name, event.kind());
            return;
        }

        // Held across the publish so signals leave in the order states change.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            TransportEvent::Connecting { attempt } => {
                *state = ConnectionState::Connecting;
                crate::log_debug!("{} socket connecting (attempt {})", name, attempt + 1);
            }
            TransportEvent::Connect => {
                *state = ConnectionState::Connected;
                crate::log_info!("{} socket connected", name);
                self.bus.publish(LifecycleSignal::connect(self.key.clone()));
            }
            TransportEvent::Disconnect { reason } => {
                *state = ConnectionState::Disconnected;
                crate::log_warn!(
                    "{} socket disconnected ({})",
                    name,
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.bus
                    .publish(LifecycleSignal::disconnect(self.key.clone(), reason.clone()));
            }
            TransportEvent::Error(error) => {
                *state = ConnectionState::Errored;
                crate::log_error!("Error on {} socket: {}", name, error);
                self.bus
                    .publish(LifecycleSignal::error(self.key.clone(), error.to_string()));
            }
            TransportEvent::Message(_) => {}
        }
    }
}

/// Owns one transport connection per configured channel.
///
/// Constructing a manager starts network activity: every channel's connection
/// is created through the factory, which begins connecting on its own.
/// Reconnection after a drop is left to the transport.
///
/// Lifecycle transitions are published on the [`SignalBus`] passed in at
/// construction. Once [`close`](Self::close) has been called no further
/// signals are published, so a `socket-disconnect` always means the
/// connection was lost rather than shut down.
pub struct ChannelConnectionManager<H: ConnectionHandle> {
    endpoint: Endpoint,
    /// Configured channels in configuration order
    keys: Vec<ChannelKey>,
    connections: HashMap<ChannelKey, H>,
    observers: HashMap<ChannelKey, Arc<ChannelObserver>>,
    bus: SignalBus,
    closing: Arc<AtomicBool>,
}

impl<H: ConnectionHandle> ChannelConnectionManager<H> {
    /// Validate `config` and open every channel.
    ///
    /// Configuration errors are returned before any connection is attempted.
    /// A channel whose connection cannot be created is logged, reported as an
    /// error signal and skipped; the remaining channels still open.
    pub fn new<F>(config: &ManagerConfig, factory: &F, bus: SignalBus) -> Result<Self, ConfigError>
    where
        F: TransportFactory<Handle = H>,
    {
        let resolved = config.validate()?;
        Ok(Self::open(resolved, factory, bus))
    }

    fn open<F>(config: ResolvedConfig, factory: &F, bus: SignalBus) -> Self
    where
        F: TransportFactory<Handle = H>,
    {
        let (endpoint, channels) = config.into_parts();
        let mut manager = Self {
            endpoint,
            keys: Vec::with_capacity(channels.len()),
            connections: HashMap::new(),
            observers: HashMap::new(),
            bus,
            closing: Arc::new(AtomicBool::new(false)),
        };

        for name in &channels {
            manager.open_channel(name, factory);
        }

        crate::log_info!(
            "Channel manager ready: {}/{} channel(s) opened against {}",
            manager.connections.len(),
            manager.keys.len(),
            manager.endpoint
        );
        manager
    }

    fn open_channel<F>(&mut self, name: &ChannelName, factory: &F)
    where
        F: TransportFactory<Handle = H>,
    {
        let key = name.key();
        let url = name.url(&self.endpoint);
        if self.observers.contains_key(&key) {
            crate::log_error!("{} is already open, not creating a second connection", key);
            return;
        }

        let observer = Arc::new(ChannelObserver {
            key: key.clone(),
            state: Mutex::new(ConnectionState::Disconnected),
            bus: self.bus.clone(),
            closing: self.closing.clone(),
        });
        self.keys.push(key.clone());
        self.observers.insert(key.clone(), observer.clone());

        let options = ConnectOptions { auto_connect: true };
        match factory.create_connection(&url, options) {
            Ok(handle) => {
                // One registration, so events seen before it replay in order.
                handle.observe(
                    &OBSERVED_EVENTS,
                    Arc::new(move |event: &TransportEvent| observer.apply(event)),
                );
                self.connections.insert(key.clone(), handle);
                crate::log_info!("Created {} connection to {}", key, url);
            }
            Err(error) => {
                crate::log_error!("Failed to create {} connection to {}: {}", key, url, error);
                observer.apply(&TransportEvent::Error(error));
            }
        }
    }

    /// Handle registered under `key`, if that channel opened.
    pub fn get(&self, key: &ChannelKey) -> Option<&H> {
        self.connections.get(key)
    }

    /// Look a handle up by its key string, e.g. `"chatSocket"`.
    pub fn lookup(&self, key: &str) -> Option<&H> {
        self.keys
            .iter()
            .find(|k| k.as_str() == key)
            .and_then(|k| self.connections.get(k))
    }

    /// Look a handle up by channel name, e.g. `"chat"`.
    pub fn get_by_name(&self, name: &str) -> Option<&H> {
        self.keys
            .iter()
            .find(|k| k.channel_name() == name)
            .and_then(|k| self.connections.get(k))
    }

    /// Current state of a channel; `None` for unknown keys and after close.
    pub fn state(&self, key: &ChannelKey) -> Option<ConnectionState> {
        self.observers.get(key).map(|observer| observer.state())
    }

    /// Configured channel keys, in configuration order.
    pub fn keys(&self) -> &[ChannelKey] {
        &self.keys
    }

    /// Channels whose connection could not be created.
    pub fn failed_channels(&self) -> Vec<&ChannelKey> {
        self.keys
            .iter()
            .filter(|key| !self.connections.contains_key(*key))
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.observers
            .values()
            .filter(|observer| observer.state().is_connected())
            .count()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Number of registered connection handles
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Close every connection and forget all channels.
    ///
    /// Each handle is closed exactly once; later calls do nothing. No
    /// lifecycle signal is published for the resulting disconnects.
    pub fn close(&mut self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut closed = 0;
        for key in &self.keys {
            if let Some(handle) = self.connections.remove(key) {
                handle.close();
                closed += 1;
            }
        }
        self.connections.clear();
        self.observers.clear();
        self.keys.clear();

        crate::log_info!("Channel manager closed {} connection(s)", closed);
    }
}

impl<H: ConnectionHandle> Drop for ChannelConnectionManager<H> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::ws::manual::{ManualConnection, ManualTransport};
    use crate::ws::signal::SignalKind;
    use tokio::sync::broadcast::error::TryRecvError;

    const ENDPOINT: &str = "http://localhost:8000";

    fn key(name: &str) -> ChannelKey {
        ChannelName::parse(name, 0).unwrap().key()
    }

    fn manager(
        channels: &[&str],
        transport: &ManualTransport,
    ) -> (ChannelConnectionManager<ManualConnection>, SignalBus) {
        let bus = SignalBus::new();
        let config = ManagerConfig::new(ENDPOINT, channels.iter().copied());
        let manager = ChannelConnectionManager::new(&config, transport, bus.clone()).unwrap();
        (manager, bus)
    }

    #[test]
    fn test_every_channel_gets_a_handle() {
        let transport = ManualTransport::new();
        let (manager, _bus) = manager(&["chat", "news", "alerts"], &transport);

        assert_eq!(manager.len(), 3);
        for name in ["chat", "news", "alerts"] {
            assert!(manager.get(&key(name)).is_some(), "missing {}", name);
            assert_eq!(manager.state(&key(name)), Some(ConnectionState::Disconnected));
        }
        assert!(manager.get(&key("other")).is_none());
        assert!(manager.lookup("chatSocket").is_some());
        assert!(manager.lookup("chat").is_none());
        assert!(manager.get_by_name("news").is_some());

        let keys: Vec<_> = manager.keys().iter().map(ChannelKey::as_str).collect();
        assert_eq!(keys, vec!["chatSocket", "newsSocket", "alertsSocket"]);
    }

    #[test]
    fn test_connections_use_autoconnect_and_channel_urls() {
        let transport = ManualTransport::new();
        let (_manager, _bus) = manager(&["chat", "news"], &transport);

        assert_eq!(
            transport.attempted_urls(),
            vec![
                "http://localhost:8000/chat-socket".to_string(),
                "http://localhost:8000/news-socket".to_string(),
            ]
        );
        assert!(transport.connections().iter().all(|c| c.options().auto_connect));
    }

    #[test]
    fn test_invalid_config_attempts_nothing() {
        let transport = ManualTransport::new();
        let bus = SignalBus::new();

        let cases = [
            ManagerConfig::new(ENDPOINT, ["chat", "chat"]),
            ManagerConfig::new(ENDPOINT, ["chat", ""]),
            ManagerConfig::new(ENDPOINT, Vec::<String>::new()),
            ManagerConfig::new("localhost:8000 nope", ["chat"]),
        ];
        for config in &cases {
            let result = ChannelConnectionManager::new(config, &transport, bus.clone());
            assert!(result.is_err(), "accepted {:?}", config);
        }
        assert!(transport.attempted_urls().is_empty());
    }

    #[test]
    fn test_connect_before_listen_yields_one_signal() {
        let transport = ManualTransport::connecting_immediately();
        let bus = SignalBus::new();
        let mut signals = bus.subscribe();
        let config = ManagerConfig::new(ENDPOINT, ["chat"]);
        let manager = ChannelConnectionManager::new(&config, &transport, bus).unwrap();

        let signal = signals.try_recv().unwrap();
        assert_eq!(signal.kind, SignalKind::Connect);
        assert_eq!(signal.channel_key.as_str(), "chatSocket");
        assert_eq!(signals.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Connected));
    }

    #[test]
    fn test_error_then_connect() {
        let transport = ManualTransport::new();
        let (manager, bus) = manager(&["chat"], &transport);
        let mut signals = bus.subscribe();
        let chat = manager.get(&key("chat")).unwrap().clone();

        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Disconnected));
        chat.emit(TransportEvent::Error(TransportError::Connect("refused".into())));
        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Errored));
        chat.emit(TransportEvent::Connect);
        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Connected));

        let first = signals.try_recv().unwrap();
        assert_eq!(first.kind, SignalKind::Error);
        assert_eq!(first.detail.as_deref(), Some("Connection failed: refused"));
        assert_eq!(signals.try_recv().unwrap().kind, SignalKind::Connect);
        assert!(signals.try_recv().is_err());
    }

    /// Reports `events` on every connection before handing it out.
    struct EagerTransport {
        inner: ManualTransport,
        events: Vec<TransportEvent>,
    }

    impl TransportFactory for EagerTransport {
        type Handle = ManualConnection;

        fn create_connection(
            &self,
            url: &str,
            options: ConnectOptions,
        ) -> Result<ManualConnection, TransportError> {
            let connection = self.inner.create_connection(url, options)?;
            for event in &self.events {
                connection.emit(event.clone());
            }
            Ok(connection)
        }
    }

    #[test]
    fn test_early_events_keep_their_order() {
        let transport = EagerTransport {
            inner: ManualTransport::new(),
            events: vec![
                TransportEvent::Connecting { attempt: 0 },
                TransportEvent::Error(TransportError::Connect("refused".into())),
                TransportEvent::Connecting { attempt: 1 },
                TransportEvent::Connect,
            ],
        };
        let bus = SignalBus::new();
        let mut signals = bus.subscribe();
        let config = ManagerConfig::new(ENDPOINT, ["chat"]);
        let manager = ChannelConnectionManager::new(&config, &transport, bus).unwrap();

        let kinds: Vec<_> = std::iter::from_fn(|| signals.try_recv().ok())
            .map(|signal| signal.kind)
            .collect();
        assert_eq!(kinds, vec![SignalKind::Error, SignalKind::Connect]);
        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Connected));
    }

    #[test]
    fn test_reopening_a_channel_is_ignored() {
        let transport = ManualTransport::new();
        let (mut manager, _bus) = manager(&["chat"], &transport);

        let chat = ChannelName::parse("chat", 0).unwrap();
        manager.open_channel(&chat, &transport);

        assert_eq!(transport.attempted_urls().len(), 1);
        assert_eq!(manager.keys(), &[key("chat")]);
        assert_eq!(manager.len(), 1);

        manager.close();
        let counts: Vec<_> = transport.connections().iter().map(|c| c.close_count()).collect();
        assert_eq!(counts, vec![1]);
    }

    #[test]
    fn test_duplicate_names_open_nothing() {
        let transport = ManualTransport::new();
        let config = ManagerConfig::new(ENDPOINT, ["chat", "news", "chat"]);

        let result = ChannelConnectionManager::new(&config, &transport, SignalBus::new());

        assert!(matches!(result, Err(ConfigError::DuplicateChannelName(name)) if name == "chat"));
        assert!(transport.attempted_urls().is_empty());
    }

    #[test]
    fn test_connecting_changes_state_without_signal() {
        let transport = ManualTransport::new();
        let (manager, bus) = manager(&["chat"], &transport);
        let mut signals = bus.subscribe();

        manager
            .get(&key("chat"))
            .unwrap()
            .emit(TransportEvent::Connecting { attempt: 0 });
        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Connecting));
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_channels_are_independent() {
        let transport = ManualTransport::new();
        let (manager, _bus) = manager(&["chat", "news"], &transport);

        manager.get(&key("chat")).unwrap().emit(TransportEvent::Connect);
        manager
            .get(&key("news"))
            .unwrap()
            .emit(TransportEvent::Error(TransportError::Protocol("bad".into())));

        assert_eq!(manager.state(&key("chat")), Some(ConnectionState::Connected));
        assert_eq!(manager.state(&key("news")), Some(ConnectionState::Errored));
        assert_eq!(manager.connected_count(), 1);
    }

    #[test]
    fn test_factory_failure_does_not_stop_other_channels() {
        let transport = ManualTransport::new();
        transport.refuse("http://localhost:8000/news-socket");
        let bus = SignalBus::new();
        let mut signals = bus.subscribe();
        let config = ManagerConfig::new(ENDPOINT, ["chat", "news", "alerts"]);
        let manager = ChannelConnectionManager::new(&config, &transport, bus).unwrap();

        assert_eq!(manager.len(), 2);
        assert!(manager.get(&key("chat")).is_some());
        assert!(manager.get(&key("news")).is_none());
        assert!(manager.get(&key("alerts")).is_some());
        assert_eq!(manager.failed_channels(), vec![&key("news")]);
        assert_eq!(manager.state(&key("news")), Some(ConnectionState::Errored));

        let signal = signals.try_recv().unwrap();
        assert_eq!(signal.kind, SignalKind::Error);
        assert_eq!(signal.channel_key, key("news"));
    }

    #[test]
    fn test_close_closes_each_handle_once() {
        let transport = ManualTransport::new();
        let (mut manager, _bus) = manager(&["chat", "news"], &transport);
        manager.get(&key("chat")).unwrap().emit(TransportEvent::Connect);

        manager.close();
        manager.close();
        drop(manager);

        for conn in transport.connections() {
            assert_eq!(conn.close_count(), 1, "{}", conn.url());
        }
    }

    #[test]
    fn test_close_clears_mapping_and_suppresses_signals() {
        let transport = ManualTransport::new();
        let (mut manager, bus) = manager(&["chat"], &transport);
        let chat = manager.get(&key("chat")).unwrap().clone();
        chat.emit(TransportEvent::Connect);
        let mut signals = bus.subscribe();

        manager.close();

        assert!(manager.is_closed());
        assert!(manager.is_empty());
        assert!(manager.get(&key("chat")).is_none());
        assert_eq!(manager.state(&key("chat")), None);

        // The client-side close already reported a disconnect; a late one
        // from the transport is ignored too.
        chat.emit(TransportEvent::Disconnect { reason: None });
        assert_eq!(signals.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_drop_closes_connections() {
        let transport = ManualTransport::new();
        {
            let (_manager, _bus) = manager(&["chat"], &transport);
        }
        assert_eq!(transport.connections()[0].close_count(), 1);
    }

    #[test]
    fn test_managers_do_not_share_connections() {
        let transport = ManualTransport::new();
        let (first, first_bus) = manager(&["chat"], &transport);
        let (second, _second_bus) = manager(&["chat"], &transport);
        let mut first_signals = first_bus.subscribe();

        let a = first.get(&key("chat")).unwrap();
        let b = second.get(&key("chat")).unwrap();
        assert!(!a.same_connection(b));

        b.emit(TransportEvent::Connect);
        assert_eq!(second.state(&key("chat")), Some(ConnectionState::Connected));
        assert_eq!(first.state(&key("chat")), Some(ConnectionState::Disconnected));
        assert!(first_signals.try_recv().is_err());
    }
}
