//! Browser WebSocket connection loop using `web_sys::WebSocket`.

use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::{FutureExt, StreamExt};
use gloo_timers::future::TimeoutFuture;
use tokio::sync::watch;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CloseEvent, ErrorEvent, Event, MessageEvent, WebSocket};

use super::{ReconnectConfig, Shared};
use crate::error::TransportError;
use crate::ws::transport::TransportEvent;

/// What the browser reported on a socket
enum SocketEvent {
    Open,
    Text(String),
    Closed(String),
    Failed,
}

/// Why a connected session ended
enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// A browser socket plus the callbacks wired into it.
///
/// Dropping it detaches the callbacks so they are freed with the socket.
struct Socket {
    ws: WebSocket,
    events: UnboundedReceiver<SocketEvent>,
    _onopen: Closure<dyn FnMut(Event)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
    _onerror: Closure<dyn FnMut(ErrorEvent)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onclose(None);
        self.ws.set_onerror(None);
        self.ws.set_onmessage(None);
    }
}

/// Spawn the reconnecting connection loop on the browser event loop.
pub(super) fn start_connection_loop(
    shared: Arc<Shared>,
    mut outbound: UnboundedReceiver<String>,
    reconnect: ReconnectConfig,
) -> Result<(), TransportError> {
    let mut shutdown = shared.shutdown.subscribe();

    spawn_local(async move {
        let mut attempt = 0u32;
        // A frame taken off the queue that never went out; retried first on the next session
        let mut unsent: Option<String> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }
            shared
                .dispatcher
                .dispatch(TransportEvent::Connecting { attempt });

            let failure = match open_socket(&shared.url, reconnect.connect_timeout_ms).await {
                Ok(mut socket) => {
                    attempt = 0;
                    crate::log_info!("WebSocket connected to {}", shared.url);
                    shared.dispatcher.dispatch(TransportEvent::Connect);

                    let end =
                        run_session(&shared, &mut socket, &mut outbound, &mut shutdown, &mut unsent)
                            .await;
                    drop(socket);
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
                Err(error) => Some(error),
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
            let pause = TimeoutFuture::new(delay).fuse();
            let stop = closed(&mut shutdown).fuse();
            futures_util::pin_mut!(pause, stop);
            let stopped = futures_util::select! {
                _ = pause => false,
                _ = stop => true,
            };
            if stopped {
                break;
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

/// Create a socket and wait until it opens, fails, or `timeout_ms` passes.
async fn open_socket(url: &str, timeout_ms: u32) -> Result<Socket, TransportError> {
    let ws = WebSocket::new(url)
        .map_err(|e| TransportError::Connect(format!("Failed to create WebSocket: {:?}", e)))?;
    let (tx, events) = unbounded::<SocketEvent>();

    let tx_open = tx.clone();
    let onopen = Closure::wrap(Box::new(move |_: Event| {
        let _ = tx_open.unbounded_send(SocketEvent::Open);
    }) as Box<dyn FnMut(Event)>);
    ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));

    let tx_close = tx.clone();
    let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = if e.reason().is_empty() {
            format!("Code {}", e.code())
        } else {
            e.reason()
        };
        let _ = tx_close.unbounded_send(SocketEvent::Closed(reason));
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

    let tx_error = tx.clone();
    let onerror = Closure::wrap(Box::new(move |_: ErrorEvent| {
        let _ = tx_error.unbounded_send(SocketEvent::Failed);
    }) as Box<dyn FnMut(ErrorEvent)>);
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

    // Binary frames are not surfaced
    let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
        if let Some(text) = e.data().as_string() {
            let _ = tx.unbounded_send(SocketEvent::Text(text));
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

    let mut socket = Socket {
        ws,
        events,
        _onopen: onopen,
        _onclose: onclose,
        _onerror: onerror,
        _onmessage: onmessage,
    };

    let timeout = TimeoutFuture::new(timeout_ms).fuse();
    futures_util::pin_mut!(timeout);
    loop {
        let next = futures_util::select! {
            event = socket.events.next() => event,
            _ = timeout => {
                let _ = socket.ws.close();
                return Err(TransportError::Connect(format!("timed out after {}ms", timeout_ms)));
            }
        };
        match next {
            Some(SocketEvent::Open) => return Ok(socket),
            Some(SocketEvent::Closed(reason)) => return Err(TransportError::Connect(reason)),
            Some(SocketEvent::Failed) | None => {
                return Err(TransportError::Connect("WebSocket error".to_string()))
            }
            Some(SocketEvent::Text(_)) => {}
        }
    }
}

/// A frame that could not be written is left in `unsent`.
async fn run_session(
    shared: &Shared,
    socket: &mut Socket,
    outbound: &mut UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
    unsent: &mut Option<String>,
) -> SessionEnd {
    if let Some(text) = unsent.take() {
        if let Err(end) = send_frame(shared, socket, text, unsent) {
            return end;
        }
    }

    loop {
        let stop = closed(shutdown).fuse();
        futures_util::pin_mut!(stop);
        futures_util::select! {
            _ = stop => {
                let _ = socket.ws.close();
                return SessionEnd::Shutdown;
            }
            next = outbound.next() => match next {
                Some(text) => {
                    if let Err(end) = send_frame(shared, socket, text, unsent) {
                        return end;
                    }
                }
                None => {
                    // Sender dropped
                    let _ = socket.ws.close();
                    return SessionEnd::Shutdown;
                }
            },
            event = socket.events.next() => match event {
                Some(SocketEvent::Text(text)) => {
                    shared.dispatcher.dispatch(TransportEvent::Message(text));
                }
                Some(SocketEvent::Open) => {}
                Some(SocketEvent::Failed) => {
                    shared.dispatcher.dispatch(TransportEvent::Error(TransportError::Protocol(
                        "WebSocket error".to_string(),
                    )));
                }
                Some(SocketEvent::Closed(reason)) => return SessionEnd::Lost(reason),
                None => return SessionEnd::Lost("transport close".to_string()),
            },
        }
    }
}

fn send_frame(
    shared: &Shared,
    socket: &Socket,
    text: String,
    unsent: &mut Option<String>,
) -> Result<(), SessionEnd> {
    // readyState 1 = OPEN
    if socket.ws.ready_state() != 1 {
        *unsent = Some(text);
        return Err(SessionEnd::Lost("transport close".to_string()));
    }
    crate::log_debug!("Sending to {}: {}", shared.url, text);
    if let Err(e) = socket.ws.send_with_str(&text) {
        shared
            .dispatcher
            .dispatch(TransportEvent::Error(TransportError::Send(format!("{:?}", e))));
        *unsent = Some(text);
        return Err(SessionEnd::Lost("transport error".to_string()));
    }
    Ok(())
}
