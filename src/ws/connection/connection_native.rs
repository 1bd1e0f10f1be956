//! Native WebSocket connection loop using tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

use super::{ReconnectConfig, Shared};
use crate::error::TransportError;
use crate::ws::transport::TransportEvent;

/// Why a connected session ended
enum SessionEnd {
    /// `close()` was called, or every sender was dropped
    Shutdown,
    /// The remote side closed or the stream failed
    Lost(String),
}

/// Spawn the reconnecting connection loop on the current tokio runtime.
pub(super) fn start_connection_loop(
    shared: Arc<Shared>,
    mut outbound: UnboundedReceiver<String>,
    reconnect: ReconnectConfig,
) -> Result<(), TransportError> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TransportError::Connect(format!("no tokio runtime: {}", e)))?;
    let mut shutdown = shared.shutdown.subscribe();

    runtime.spawn(async move {
        let mut attempt = 0u32;
        // A frame taken off the queue whose send failed; retried first on the next session
        let mut unsent: Option<String> = None;
        let timeout = Duration::from_millis(reconnect.connect_timeout_ms as u64);

        loop {
            if *shutdown.borrow() {
                break;
            }
            shared
                .dispatcher
                .dispatch(TransportEvent::Connecting { attempt });

            let result = tokio::select! {
                result = tokio::time::timeout(timeout, connect_async(shared.url.as_str())) => result,
                _ = closed(&mut shutdown) => break,
            };

            let failure = match result {
                Ok(Ok((stream, _response))) => {
                    attempt = 0;
                    crate::log_info!("WebSocket connected to {}", shared.url);
                    shared.dispatcher.dispatch(TransportEvent::Connect);

                    let end =
                        run_session(&shared, stream, &mut outbound, &mut shutdown, &mut unsent)
                            .await;
                    let reason = match &end {
                        SessionEnd::Shutdown => "io client disconnect".to_string(),
                        SessionEnd::Lost(reason) => reason.clone(),
                    };
                    crate::log_info!("WebSocket to {} closed: {}", shared.url, reason);
                    shared.dispatcher.dispatch(TransportEvent::Disconnect {
                        reason: Some(reason),
                    });
                    if matches!(end, SessionEnd::Shutdown) {
                        break;
                    }
                    None
                }
                Ok(Err(e)) => Some(TransportError::Connect(e.to_string())),
                Err(_) => Some(TransportError::Connect(format!(
                    "timed out after {}ms",
                    reconnect.connect_timeout_ms
                ))),
            };

            if let Some(error) = failure {
                crate::log_error!("WebSocket error for {}: {}", shared.url, error);
                shared.dispatcher.dispatch(TransportEvent::Error(error));

                if !reconnect.allows_retry(attempt) {
                    crate::log_warn!(
                        "Giving up on {} after {} reconnect attempts",
                        shared.url,
                        attempt
                    );
                    shared
                        .dispatcher
                        .dispatch(TransportEvent::Error(TransportError::ReconnectExhausted(
                            attempt,
                        )));
                    break;
                }
            }

            // Wait before reconnecting
            let delay = reconnect.delay_for_attempt(attempt);
            crate::log_info!(
                "Reconnecting to {} in {}ms (attempt {})",
                shared.url,
                delay,
                attempt + 1
            );
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay as u64)) => {}
                _ = closed(&mut shutdown) => break,
            }
            attempt += 1;
        }

        crate::log_debug!("Connection loop for {} stopped", shared.url);
    });

    Ok(())
}

/// Resolves once `close()` was called or the connection was dropped.
async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

/// Pump frames both ways until the connection drops or shutdown is requested.
///
/// A frame that could not be written is left in `unsent`.
async fn run_session<S>(
    shared: &Shared,
    stream: S,
    outbound: &mut UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
    unsent: &mut Option<String>,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = stream.split();

    if let Some(text) = unsent.take() {
        if let Err(e) = write.send(Message::Text(text.clone().into())).await {
            crate::log_error!("Resend failed: {}", e);
            *unsent = Some(text);
            return SessionEnd::Lost("transport error".to_string());
        }
    }

    loop {
        tokio::select! {
            _ = closed(shutdown) => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            next = outbound.next() => match next {
                Some(text) => {
                    crate::log_debug!("Sending to {}: {}", shared.url, text);
                    if let Err(e) = write.send(Message::Text(text.clone().into())).await {
                        crate::log_error!("Send failed: {}", e);
                        *unsent = Some(text);
                        shared
                            .dispatcher
                            .dispatch(TransportEvent::Error(TransportError::Send(e.to_string())));
                        return SessionEnd::Lost("transport error".to_string());
                    }
                }
                None => {
                    // Sender dropped
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    shared
                        .dispatcher
                        .dispatch(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "transport close".to_string());
                    return SessionEnd::Lost(reason);
                }
                Some(Ok(Message::Ping(data))) => {
                    // Pong is handled automatically by tungstenite
                    crate::log_debug!("Received ping: {:?}", data);
                }
                Some(Ok(_)) => {
                    // Ignore binary, pong, etc.
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    shared
                        .dispatcher
                        .dispatch(TransportEvent::Error(TransportError::Protocol(e.to_string())));
                    return SessionEnd::Lost("transport error".to_string());
                }
                None => return SessionEnd::Lost("transport close".to_string()),
            },
        }
    }
}
