//! Connection handlers.
//!
//! This module handles the connection lifecycle and frame processing.

use crate::api;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;
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
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use skillswap_core::{generate_connection_id, Outbound};
use skillswap_protocol::{codec, codes, ClientEvent, Encoded, Encoding, ServerEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(api::routes())
        .with_state(state)
}

/// Serve on `listener` until `shutdown` completes.
///
/// The typing sweeper runs for the lifetime of the server.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let sweeper = state
        .dispatcher
        .typing()
        .spawn_sweeper(state.config.sweep_interval());

    let app = build_app(Arc::clone(&state));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    sweeper.shutdown().await;
    served?;
    info!("Server stopped");
    Ok(())
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::from_config(config)?);
    let listener = TcpListener::bind(addr).await?;

    info!("skillswap server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.dispatcher.router().stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connection_count,
        "channels": stats.channel_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max_frame = state.config.limits.max_message_size;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = generate_connection_id();
    let dispatcher = &state.dispatcher;

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    let (sink, mut outbound) = mpsc::unbounded_channel::<Outbound>();
    if let Err(e) = dispatcher.connect(&connection_id, sink) {
        warn!(connection = %connection_id, error = %e, "Connection refused");
        let refusal = ServerEvent::error(codes::SUBSCRIPTION, e.to_string());
        let _ = send_event(&mut sender, &refusal, Encoding::Text).await;
        let _ = sender.close().await;
        return;
    }

    debug!(connection = %connection_id, "WebSocket connected");

    // Replies follow the encoding of the most recent inbound frame.
    let mut encoding = Encoding::Text;

    let connected = ServerEvent::connected(
        &connection_id,
        u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX),
    );
    if send_event(&mut sender, &connected, encoding).await.is_err() {
        error!(connection = %connection_id, "Failed to send connected event");
        dispatcher.disconnect(&connection_id);
        return;
    }

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Events routed to this connection
            Some(event) = outbound.recv() => {
                if send_event(&mut sender, &event, encoding).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        encoding = Encoding::Text;
                        metrics::record_frame(text.len(), "inbound");
                        match codec::decode_json::<ClientEvent>(&text) {
                            Ok(event) => dispatch(&state, &connection_id, event).await,
                            Err(e) => reject_frame(&state, &connection_id, &e),
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        encoding = Encoding::Binary;
                        metrics::record_frame(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        // Try to decode frames
                        loop {
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => dispatch(&state, &connection_id, event).await,
                                Ok(None) => break,
                                Err(e) => {
                                    reject_frame(&state, &connection_id, &e);
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        dispatcher.presence().touch(&connection_id);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    dispatcher.disconnect(&connection_id);
    metrics::set_active_channels(dispatcher.router().stats().channel_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Hand a decoded event to the dispatcher.
async fn dispatch(state: &AppState, connection_id: &str, event: ClientEvent) {
    let start = Instant::now();
    let kind = event.kind().as_str();
    metrics::record_event(kind);

    state.dispatcher.handle(connection_id, event).await;

    metrics::record_latency(start.elapsed().as_secs_f64());
    if matches!(kind, "join_match" | "leave_match") {
        metrics::set_active_channels(state.dispatcher.router().stats().channel_count);
    }
}

fn reject_frame(state: &AppState, connection_id: &str, err: &skillswap_protocol::ProtocolError) {
    debug!(connection = %connection_id, error = %err, "Undecodable frame");
    metrics::record_error("decode");
    state
        .dispatcher
        .reject(connection_id, codes::INVALID_EVENT, err.to_string());
}

/// Send an event to the WebSocket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
    encoding: Encoding,
) -> Result<()> {
    let encoded = codec::encode_as(event, encoding)?;
    metrics::record_frame(encoded.size(), "outbound");
    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sender.send(message).await?;
    Ok(())
}
