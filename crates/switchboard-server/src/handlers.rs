//! Connection handling for the Switchboard server.
//!
//! This module is the transport listener: it upgrades WebSocket connections,
//! registers them, runs each session's read/write loop, and guarantees
//! exactly-once cleanup.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use switchboard_core::{
    BroadcastHub, ConnState, ConnectionId, HubConfig, Registry, RegistryConfig, RegistryError,
    SignalError, SignalRelay,
};
use switchboard_protocol::{codec, codes, Frame, PROTOCOL_VERSION};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The connection registry.
    pub registry: Arc<Registry>,
    /// Broadcast fan-out.
    pub hub: BroadcastHub,
    /// Directed signaling.
    pub signals: SignalRelay,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(Registry::with_config(RegistryConfig {
            max_connections: config.limits.max_connections,
            outbox_capacity: config.limits.outbox_capacity,
        }));

        let hub = BroadcastHub::with_config(
            Arc::clone(&registry),
            HubConfig {
                echo_to_sender: config.relay.echo_to_sender,
            },
        );
        let signals = SignalRelay::new(Arc::clone(&registry));

        Self {
            registry,
            hub,
            signals,
            config,
        }
    }
}

/// Build the application router.
///
/// Standalone so an embedding application can `merge` or `nest` collaborator
/// routes (an auxiliary sub-protocol relay, say) onto the same listener; the
/// relay does not assume exclusive ownership of the socket.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.relay.path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until shutdown.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = app_router(Arc::clone(&state));

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Switchboard listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, config.relay.path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("Listener released");
    Ok(())
}

/// Resolve on SIGINT, after sealing and draining the registry. Resolution
/// stops the accept loop; draining has already pushed every live session into
/// `Closing`, so the serve future finishes once their sockets unwind.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    info!("Shutdown signal received");
    state.registry.seal();
    state.registry.drain();
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection from registration to cleanup.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut sender, mut receiver) = socket.split();

    // Connecting -> Registered, or refused outright.
    let registration = match state.registry.register() {
        Ok(registration) => registration,
        Err(e) => {
            warn!(error = %e, "Registration refused");
            metrics::record_error("register");
            let refusal = Frame::error(0, codes::CAPACITY_EXCEEDED, e.to_string());
            if let Ok(data) = codec::encode(&refusal) {
                let _ = sender.send(Message::Binary(data.to_vec())).await;
            }
            return;
        }
    };
    let connection_id = registration.id;
    let mut outbox_rx = registration.outbox_rx;
    let lifecycle = registration.lifecycle;

    debug!(connection = %connection_id, "WebSocket connected");

    let connected = Frame::connected(
        connection_id.to_string(),
        PROTOCOL_VERSION,
        state.config.heartbeat.interval_ms as u32,
    );
    if send_frame(&mut sender, &connected).await.is_err() {
        error!(connection = %connection_id, "Failed to send Connected frame");
        state.registry.unregister(connection_id);
        return;
    }
    lifecycle.advance(ConnState::Active);

    let write_timeout = state.config.write_timeout();
    let max_message_size = state.config.limits.max_message_size;

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    'session: loop {
        tokio::select! {
            biased;

            // Frames queued for this connection by the hub and relay.
            queued = outbox_rx.recv() => {
                let Some(data) = queued else {
                    // Outbox gone: unregistered by a failure report or drain.
                    debug!(connection = %connection_id, "Outbox closed");
                    break 'session;
                };
                metrics::record_message(data.len(), "outbound");
                match timeout(write_timeout, sender.send(Message::Binary(data.to_vec()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "Write failed");
                        metrics::record_error("write");
                        break 'session;
                    }
                    Err(_) => {
                        warn!(connection = %connection_id, "Write timed out");
                        metrics::record_error("write_timeout");
                        break 'session;
                    }
                }
            }

            // Inbound traffic from the socket.
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > max_message_size {
                            warn!(connection = %connection_id, size = data.len(), "Message too large");
                            let refusal = Frame::error(0, codes::PAYLOAD_TOO_LARGE, "message too large");
                            if send_frame(&mut sender, &refusal).await.is_err() {
                                break 'session;
                            }
                            continue 'session;
                        }

                        metrics::record_message(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        loop {
                            match codec::decode_from(&mut read_buffer) {
                                Ok(Some(frame)) => {
                                    if handle_frame(&frame, connection_id, &state, &mut sender)
                                        .await
                                        .is_err()
                                    {
                                        break 'session;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    // Stream alignment is lost; the session cannot continue.
                                    warn!(connection = %connection_id, error = %e, "Malformed frame");
                                    metrics::record_error("protocol");
                                    let refusal =
                                        Frame::error(0, codes::MALFORMED_FRAME, e.to_string());
                                    let _ = send_frame(&mut sender, &refusal).await;
                                    break 'session;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as binary
                        read_buffer.extend_from_slice(text.as_bytes());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break 'session;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break 'session;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break 'session;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break 'session;
                    }
                }
            }
        }
    }

    // Every terminal path funnels here; idempotent unregister absorbs races
    // with failure-report unregistration from other sessions.
    state.registry.unregister(connection_id);
    metrics::set_peers_bound(state.registry.stats().bound_peers);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Handle a decoded frame. An `Err` means the socket itself failed and the
/// session must end; routing-level failures are answered with `Error` frames.
async fn handle_frame(
    frame: &Frame,
    connection_id: ConnectionId,
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Result<()> {
    match frame {
        Frame::Broadcast { id, payload } => {
            let fanout = match state.hub.publish(connection_id, payload.clone()) {
                Ok(fanout) => fanout,
                Err(e) => {
                    send_frame(
                        sender,
                        &Frame::error(id.unwrap_or(0), codes::PAYLOAD_TOO_LARGE, e.to_string()),
                    )
                    .await?;
                    return Ok(());
                }
            };

            metrics::record_broadcast(fanout.delivered);

            // A connection that would not take the frame is failed, not the
            // broadcast: drop it, the rest already have their copy.
            for failed in &fanout.failed {
                warn!(connection = %failed, "Dropping connection after failed delivery");
                metrics::record_error("delivery");
                state.registry.unregister(*failed);
            }

            if let Some(request) = id {
                send_frame(sender, &Frame::ack(*request)).await?;
            }

            debug!(connection = %connection_id, recipients = fanout.delivered, "Broadcast");
        }

        Frame::Signal {
            id,
            target,
            payload,
            ..
        } => {
            // Provenance comes from the registry, not from the wire.
            let identity = state
                .registry
                .peer_alias(connection_id)
                .unwrap_or_else(|| connection_id.to_string());

            match state.signals.relay(&identity, target, payload.clone()) {
                Ok(delivered_to) => {
                    metrics::record_signal("relayed");
                    if let Some(request) = id {
                        send_frame(sender, &Frame::ack(*request)).await?;
                    }
                    debug!(
                        connection = %connection_id,
                        target = %target,
                        delivered = %delivered_to,
                        "Signal relayed"
                    );
                }
                Err(SignalError::PeerUnreachable(peer)) => {
                    metrics::record_signal("unreachable");
                    send_frame(
                        sender,
                        &Frame::error(
                            id.unwrap_or(0),
                            codes::PEER_UNREACHABLE,
                            format!("peer unreachable: {peer}"),
                        ),
                    )
                    .await?;
                }
                Err(SignalError::DeliveryFailed(conn)) => {
                    metrics::record_signal("failed");
                    state.registry.unregister(conn);
                    send_frame(
                        sender,
                        &Frame::error(
                            id.unwrap_or(0),
                            codes::PEER_UNREACHABLE,
                            format!("peer unreachable: {target}"),
                        ),
                    )
                    .await?;
                }
                Err(SignalError::Encode(e)) => {
                    send_frame(
                        sender,
                        &Frame::error(id.unwrap_or(0), codes::PAYLOAD_TOO_LARGE, e.to_string()),
                    )
                    .await?;
                }
            }
        }

        Frame::Bind { id, peer_id } => {
            debug!(connection = %connection_id, peer = %peer_id, "Bind request");

            let response = match state.registry.bind_peer(connection_id, peer_id) {
                Ok(()) => {
                    metrics::set_peers_bound(state.registry.stats().bound_peers);
                    Frame::ack(*id)
                }
                Err(e @ RegistryError::DuplicatePeerId(_)) => {
                    Frame::error(*id, codes::DUPLICATE_PEER_ID, e.to_string())
                }
                Err(e @ RegistryError::UnknownConnection(_)) => {
                    Frame::error(*id, codes::UNKNOWN_CONNECTION, e.to_string())
                }
                Err(e) => Frame::error(*id, codes::MALFORMED_FRAME, e.to_string()),
            };

            send_frame(sender, &response).await?;
        }

        Frame::Ping { timestamp } => {
            send_frame(sender, &Frame::pong(*timestamp)).await?;
        }

        Frame::Pong { .. } => {
            // Keepalive only
        }

        Frame::Connect { version, token } => {
            // The server completes the handshake proactively; a Connect after
            // that is informational unless the version is unserveable.
            if !switchboard_protocol::is_supported(*version) {
                warn!(connection = %connection_id, version, "Unsupported protocol version");
            }
            debug!(
                connection = %connection_id,
                version = version,
                has_token = token.is_some(),
                "Connect frame (already connected)"
            );
        }

        _ => {
            warn!(connection = %connection_id, frame_type = ?frame.frame_type(), "Unexpected frame type");
        }
    }

    Ok(())
}

/// Send a frame to the WebSocket.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &Frame,
) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
