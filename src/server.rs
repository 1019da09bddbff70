//! HTTP surface: WebSocket subscriptions and the liveness probe.
//!
//! `GET /telemetry` upgrades to a WebSocket and streams one JSON text message
//! per broadcast record. `GET /healthz` always answers 200.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hub::{BroadcastHub, Subscription};
use crate::{RelayError, Result};

/// A client that cannot take a frame within this long is disconnected.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ServerState {
    hub: BroadcastHub,
    queue: usize,
}

/// Build the router serving `/telemetry` and `/healthz`.
pub fn router(hub: BroadcastHub, subscriber_queue: usize) -> Router {
    Router::new()
        .route("/telemetry", get(telemetry_handler))
        .route("/healthz", get(health_handler))
        .with_state(ServerState { hub, queue: subscriber_queue })
}

/// Bind the HTTP listener and serve until `cancel` fires.
///
/// Binding happens before this returns so a taken port fails startup.
pub async fn serve(
    addr: SocketAddr,
    hub: BroadcastHub,
    subscriber_queue: usize,
    cancel: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener =
        TcpListener::bind(addr).await.map_err(|e| RelayError::bind_failed("HTTP listener", addr, e))?;
    let local = listener.local_addr()?;
    info!(addr = %local, "Subscription server listening on /telemetry");

    let app = router(hub, subscriber_queue);
    let handle = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("Subscription server error: {}", e);
        }
    });

    Ok((local, handle))
}

async fn health_handler() -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")]).into_response()
}

async fn telemetry_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let subscription = state.hub.subscribe(state.queue);
        forward(socket, subscription).await;
    })
}

/// Pump records from the hub into one WebSocket until either side goes away.
///
/// Returning drops the subscription; the hub evicts it on its next push.
async fn forward(socket: WebSocket, mut subscription: Subscription) {
    let id = subscription.id();
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            record = subscription.recv() => {
                let Some(record) = record else {
                    debug!(%id, "Hub closed subscription");
                    let _ = send_within(&mut sink, Message::Close(None), SEND_TIMEOUT).await;
                    break;
                };
                let text = match serde_json::to_string(&*record) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(%id, error = %RelayError::from(e), "Dropping unserializable record");
                        continue;
                    }
                };
                match send_within(&mut sink, Message::Text(text.into()), SEND_TIMEOUT).await {
                    SendOutcome::Sent => {}
                    SendOutcome::Failed(e) => {
                        debug!(%id, error = %e, "WebSocket send failed");
                        break;
                    }
                    SendOutcome::Stalled => {
                        warn!(%id, timeout = ?SEND_TIMEOUT, "Client stopped reading, disconnecting");
                        break;
                    }
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(%id, "Client closed connection");
                    break;
                }
                Some(Err(e)) => {
                    debug!(%id, error = %e, "WebSocket receive failed");
                    break;
                }
                // Pings are answered by the protocol layer; other input is ignored
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%id, "Subscriber disconnected");
}

#[derive(Debug)]
enum SendOutcome<E> {
    Sent,
    Failed(E),
    /// The peer did not accept the frame before the deadline
    Stalled,
}

async fn send_within<S>(sink: &mut S, message: Message, limit: Duration) -> SendOutcome<S::Error>
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => SendOutcome::Sent,
        Ok(Err(e)) => SendOutcome::Failed(e),
        Err(_) => SendOutcome::Stalled,
    }
}
