//! Per-connection WebSocket loop.
//!
//! Each socket is split into a writer task (queued frames, heartbeat pings,
//! shutdown close) and a reader task (inbound events, pong tracking).
//! Inbound frames of one connection are handled strictly in order, and the
//! relay's disconnect runs only after the reader has stopped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, trace, warn};

use jamroom_core::protocol::InboundEvent;

use crate::context::AppContext;
use crate::gateway::Connection;
use crate::relay::{DisconnectReason, SignalingRelay};

/// Drive one upgraded WebSocket until it closes.
pub async fn handle_ws_connection(socket: WebSocket, ctx: AppContext) {
    let (connection, mut rx) = ctx.gateway.register();
    let conn_id = connection.id.clone();
    info!(conn_id = %conn_id, "WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let heartbeat_interval = ctx.config.heartbeat_interval();
    let heartbeat_timeout = ctx.config.heartbeat_timeout();
    let shutdown = ctx.shutdown.clone();
    let writer_conn = Arc::clone(&connection);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(text) = frame else {
                        return DisconnectReason::ClientClosed;
                    };
                    if let Err(e) = ws_tx.send(WsMessage::Text(text.as_str().into())).await {
                        return DisconnectReason::TransportError(e.to_string());
                    }
                }
                _ = ping_interval.tick() => {
                    if writer_conn.last_pong_elapsed() > heartbeat_timeout {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        return DisconnectReason::HeartbeatTimeout;
                    }
                    if let Err(e) = ws_tx.send(WsMessage::Ping(Vec::new().into())).await {
                        return DisconnectReason::TransportError(e.to_string());
                    }
                    trace!(conn_id = %writer_conn.id, "sent ping");
                }
                _ = shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: close_code::AWAY,
                        reason: Utf8Bytes::from_static("server shutting down"),
                    };
                    let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
                    return DisconnectReason::ServerShutdown;
                }
            }
        }
    });

    let reader_conn = Arc::clone(&connection);
    let relay = Arc::clone(&ctx.relay);
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => supervise(&relay, &reader_conn, text.as_str()),
                Ok(WsMessage::Pong(_)) | Ok(WsMessage::Ping(_)) => reader_conn.record_pong(),
                Ok(WsMessage::Binary(bytes)) => {
                    debug!(conn_id = %reader_conn.id, len = bytes.len(), "ignoring binary frame");
                }
                Ok(WsMessage::Close(_)) => return DisconnectReason::ClientClosed,
                Err(e) => return DisconnectReason::TransportError(e.to_string()),
            }
        }
        DisconnectReason::ClientClosed
    });

    // The aborted half is awaited so a frame it is still handling finishes
    // before the disconnect broadcasts.
    let reason = tokio::select! {
        result = &mut writer => {
            reader.abort();
            let _ = reader.await;
            result.unwrap_or_else(|e| DisconnectReason::TransportError(e.to_string()))
        }
        result = &mut reader => {
            writer.abort();
            let _ = writer.await;
            result.unwrap_or_else(|e| DisconnectReason::TransportError(e.to_string()))
        }
    };

    let _ = ctx.relay.disconnect(&conn_id, reason);
}

/// Handle one inbound text frame behind a panic boundary so a faulty event
/// cannot take down the connection or the process.
pub fn supervise(relay: &SignalingRelay, connection: &Connection, text: &str) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| dispatch_frame(relay, connection, text)));
    if outcome.is_err() {
        error!(conn_id = %connection.id, "inbound event handler panicked");
    }
}

fn dispatch_frame(relay: &SignalingRelay, connection: &Connection, text: &str) {
    match InboundEvent::parse(text) {
        Ok(InboundEvent::JoinRoom {
            session_id,
            peer_id,
        }) => {
            let _ = relay.join(&connection.id, session_id, peer_id);
        }
        Err(e) => {
            warn!(conn_id = %connection.id, error = %e, "ignoring inbound frame");
        }
    }
}
