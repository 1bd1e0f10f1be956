//! Channel Sockets - command line entry point
//!
//! Opens every configured channel, logs lifecycle signals as they arrive and
//! tears the connections down on Ctrl-C.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use channel_sockets::{
        ChannelConnectionManager, ConnectivityStatus, ManagerConfig, SignalBus, WsTransport,
    };
    use tokio::sync::broadcast::error::RecvError;
    use tracing_subscriber::EnvFilter;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("channel_sockets=debug")),
        )
        .init();

    let config = ManagerConfig::from_env();
    let bus = SignalBus::new();
    let mut signals = bus.subscribe();

    let mut manager = ChannelConnectionManager::new(&config, &WsTransport::new(), bus)
        .with_context(|| format!("invalid channel configuration: {:?}", config))?;

    let mut status = ConnectivityStatus::new();
    status.track(manager.keys());
    tracing::info!(
        endpoint = %manager.endpoint(),
        channels = manager.keys().len(),
        "Channel sockets started"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            received = signals.recv() => match received {
                Ok(signal) => {
                    status.apply(&signal);
                    tracing::info!(
                        event = signal.event_name(),
                        detail = %signal.payload_json(),
                        "{}",
                        status.summary()
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} lifecycle signals", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.close();
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
