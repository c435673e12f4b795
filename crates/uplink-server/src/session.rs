//! WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uplink_core::{ClientId, ClientMessage, InboundFrame, OutboundEnvelope, message_type};

use crate::connection::ClientConnection;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_INVALID_FRAMES_TOTAL, WS_MESSAGES_RECEIVED_TOTAL,
    WS_MESSAGES_SENT_TOTAL,
};
use crate::server::ServerShared;

/// Close reason for clients that stop producing traffic.
const HEARTBEAT_REASON: &str = "heartbeat timeout";

/// How long to wait for the outbound forwarder to flush its close frame.
const FORWARDER_DRAIN: Duration = Duration::from_secs(1);

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and invokes the connect callback
/// 2. Sends a `connected` envelope with the assigned client ID
/// 3. Forwards outbound payloads via the send channel, pinging periodically
/// 4. Dispatches incoming text frames to the protocol handler
/// 5. Cleans up on disconnect
#[instrument(skip_all, fields(client_id = %client_id))]
pub(crate) async fn run_session(socket: WebSocket, client_id: ClientId, shared: Arc<ServerShared>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Create the client connection and send channel
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(shared.config.send_buffer);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    shared.registry.register(Arc::clone(&connection)).await;
    shared.handlers_snapshot().dispatch_connect(client_id.clone());

    // Welcome envelope goes straight to the socket, ahead of any queued
    // broadcast. A failed write does not roll back registration.
    let welcome = OutboundEnvelope::connected(&client_id);
    match ws_tx.send(Message::Text(welcome.to_wire().into())).await {
        Ok(()) => counter!(WS_MESSAGES_SENT_TOTAL).increment(1),
        Err(error) => warn!(%error, "failed to send connected envelope"),
    }

    // Spawn outbound forwarder with periodic Ping frames.
    let mut forwarder = tokio::spawn(forward_outbound(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        Duration::from_secs(shared.config.heartbeat_interval_secs),
        Duration::from_secs(shared.config.heartbeat_timeout_secs),
    ));

    // Process incoming frames until the peer leaves or the connection is
    // told to close.
    loop {
        let incoming = tokio::select! {
            incoming = ws_rx.next() => incoming,
            () = connection.cancelled() => break,
        };
        let Some(result) = incoming else { break };
        let frame = match result {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "websocket error");
                break;
            }
        };

        // Extract text from either Text or Binary frames
        let text = match frame {
            Message::Text(ref text) => {
                connection.mark_alive();
                Some(text.to_string())
            }
            Message::Binary(ref data) => {
                connection.mark_alive();
                match std::str::from_utf8(data) {
                    Ok(text) => Some(text.to_owned()),
                    Err(_) => {
                        info!(len = data.len(), "received non-UTF8 binary frame");
                        None
                    }
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };
        handle_frame(&text, &connection, &shared).await;
    }

    // Clean up
    info!("client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

    // Make the forwarder exit and flush its close frame, then stop waiting.
    connection.close(close_code::NORMAL, "");
    if tokio::time::timeout(FORWARDER_DRAIN, &mut forwarder).await.is_err() {
        forwarder.abort();
    }

    let _ = shared.registry.remove(&client_id).await;
    shared.handlers_snapshot().dispatch_disconnect(client_id);
}

/// Drain the send channel into the socket, pinging on an interval and
/// disconnecting clients that have gone silent for too long.
async fn forward_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    ping_interval: Duration,
    idle_timeout: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            outbound = send_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if !connection.check_alive() && connection.last_seen_elapsed() > idle_timeout {
                    warn!(client_id = %connection.id, "client unresponsive, disconnecting");
                    connection.close(close_code::AWAY, HEARTBEAT_REASON);
                    continue;
                }
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            () = connection.cancelled() => {
                let signal = connection.close_signal();
                let frame = CloseFrame {
                    code: signal.code,
                    reason: signal.reason.into(),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}

/// What an inbound text frame turned out to be.
#[derive(Debug)]
enum Inbound {
    /// Built-in heartbeat request.
    Ping,
    /// A well-formed frame to hand to the application.
    Frame(InboundFrame),
    /// Not a JSON object with a string `type` field.
    Malformed,
}

/// Parse an inbound text frame.
fn classify(text: &str) -> Inbound {
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) if frame.message_type == message_type::PING => Inbound::Ping,
        Ok(frame) => Inbound::Frame(frame),
        Err(_) => Inbound::Malformed,
    }
}

/// Handle one inbound text frame from a client.
///
/// Heartbeats are answered directly and never reach the application.
/// Malformed frames get an `error` envelope back; the connection stays open.
async fn handle_frame(text: &str, connection: &Arc<ClientConnection>, shared: &Arc<ServerShared>) {
    counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);

    match classify(text) {
        Inbound::Ping => {
            let reply = OutboundEnvelope::pong();
            if connection.send(Arc::new(reply.to_wire())) {
                counter!(WS_MESSAGES_SENT_TOTAL).increment(1);
            } else {
                debug!("failed to enqueue pong");
            }
        }
        Inbound::Malformed => {
            counter!(WS_INVALID_FRAMES_TOTAL).increment(1);
            warn!(len = text.len(), "malformed inbound frame");
            let reply = OutboundEnvelope::invalid_format();
            if connection.send(Arc::new(reply.to_wire())) {
                counter!(WS_MESSAGES_SENT_TOTAL).increment(1);
            } else {
                debug!("failed to enqueue error reply");
            }
        }
        Inbound::Frame(frame) => {
            let message = ClientMessage::from_frame(frame, connection.id.clone());
            debug!(message_type = %message.message_type, "dispatching message");
            let handlers = shared.handlers_snapshot();
            handlers.dispatch_message(message.clone());
            handlers.dispatch_custom(message.message_type, message.data, message.client_id);
        }
    }
}
