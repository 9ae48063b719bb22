//! The persistent-channel (WebSocket) surface.
//!
//! Grounded on `original_source/linear_stage/generic/ws.py`'s
//! `WSApplicationProtocol.run()` (handshake, command loop, disconnect
//! cleanup) and `main.py`'s exception-to-close-code mapping
//! (`ValidationError` -> send an error frame then close 1008,
//! `AccessLevelException` likewise). This surface talks directly to
//! `axum::extract::ws::WebSocketUpgrade` rather than a Socket.IO-style
//! framework, because the handshake here is a single raw JSON message
//! followed by an application-level close code, which doesn't map cleanly
//! onto Socket.IO's envelope.
//!
//! Unlike the Python original, inbound commands and outbound broadcasts
//! share a single task instead of a split sink/stream pair: every error
//! path — malformed JSON, an unknown device, an access-level refusal — has
//! to both send a frame and close the socket, which a `tokio::select!`
//! loop over one owned `WebSocket` does directly, instead of coordinating
//! that shutdown across a forwarder task.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use labctrl_core::{
    ChannelCommand, ChannelCommandAck, ChannelHandshake, ChannelHandshakeAck, ChannelMessage,
    CommandResponse, SensorOperation, StageOperation,
};

use crate::config::AccessLevel;
use crate::device::stage;
use crate::subscriptions::SessionRecord;
use crate::AppState;

/// RFC 6455 policy-violation close code, used throughout
/// `original_source` for authentication and validation failures.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Deserialize)]
pub struct WsQuery {
    device: String,
}

pub async fn ws_route(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.device))
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

/// Sends `{"error": reason}` followed by a policy-violation close, the
/// shape `main.py` sends on `ValidationError`/`AccessLevelException`
/// before dropping the connection.
async fn fail(socket: &mut WebSocket, reason: &str) {
    let frame = serde_json::json!({ "error": reason }).to_string();
    let _ = socket.send(Message::Text(frame.into())).await;
    close_with(socket, CLOSE_POLICY_VIOLATION, reason).await;
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, device_name: String) {
    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        close_with(&mut socket, CLOSE_POLICY_VIOLATION, "expected handshake message").await;
        return;
    };

    let handshake: ChannelHandshake = match serde_json::from_str(&text) {
        Ok(h) => h,
        Err(_) => {
            close_with(&mut socket, CLOSE_POLICY_VIOLATION, "malformed handshake").await;
            return;
        }
    };

    let claims = match state.auth.validate(&handshake.token).await {
        Ok(c) => c,
        Err(_) => {
            close_with(&mut socket, CLOSE_POLICY_VIOLATION, "authentication failed").await;
            return;
        }
    };

    let ack = serde_json::to_string(&ChannelHandshakeAck::success()).unwrap();
    if socket.send(Message::Text(ack.into())).await.is_err() {
        return;
    }

    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ChannelMessage>(32);
    state
        .subscriptions
        .subscribe(SessionRecord {
            id: session_id,
            username: claims.sub.clone(),
            access_level: claims.access_level,
            sender: tx.clone(),
        })
        .await;

    info!(session = %session_id, username = %claims.sub, device = %device_name, "channel open");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else {
                    break;
                };
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                let Some(message) = inbound else {
                    break;
                };
                let message = match message {
                    Ok(m) => m,
                    Err(_) => break,
                };
                match message {
                    Message::Text(text) => {
                        if let Err(reason) =
                            handle_command(&state, &device_name, claims.access_level, &text, &tx).await
                        {
                            fail(&mut socket, &reason).await;
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.subscriptions.unsubscribe(session_id).await;
    info!(session = %session_id, "channel closed");
}

/// Dispatches one inbound command and, when the caller attached a `cid`,
/// sends a direct `ChannelCommandAck` back down its own channel. Mirrors
/// `api.py`'s `websocket_command`, which tags every outgoing command with a
/// `cid` and resolves a per-cid future when the matching ack arrives;
/// callers that omit `cid` get only the broadcast side effects, same as the
/// original's fire-and-forget path.
///
/// Returning `Err` here means the connection is no longer trustworthy —
/// malformed input, an unknown device, or a caller below the operation's
/// access level — and the caller closes the socket with policy-violation
/// rather than continuing to read from it.
async fn handle_command(
    state: &AppState,
    device_name: &str,
    access_level: AccessLevel,
    text: &str,
    reply_to: &mpsc::Sender<ChannelMessage>,
) -> Result<(), String> {
    let response = match device_name {
        "stage" => {
            let command: ChannelCommand<StageOperation> =
                serde_json::from_str(text).map_err(|e| e.to_string())?;
            let required = match command.operation {
                StageOperation::GetStatus => AccessLevel::Readonly,
                _ => AccessLevel::Standard,
            };
            if access_level < required {
                return Err("insufficient access level".into());
            }
            let result = stage::dispatch(&state.stage, command.operation).await;
            (command.cid, result.map_err(|e| e.to_string()))
        }
        "sensor" => {
            let command: ChannelCommand<SensorOperation> =
                serde_json::from_str(text).map_err(|e| e.to_string())?;
            let required = match command.operation {
                SensorOperation::GetStatus | SensorOperation::GetSample => AccessLevel::Readonly,
                _ => AccessLevel::Standard,
            };
            if access_level < required {
                return Err("insufficient access level".into());
            }
            let result = state.sensor.dispatch(command.operation).await;
            (command.cid, result.map_err(|e| e.to_string()))
        }
        other => return Err(format!("no such device: {other}")),
    };

    let (cid, result) = response;
    let Some(cid) = cid else {
        return result.map(|_| ());
    };

    let ack_response = match &result {
        Ok(r) => r.clone(),
        Err(message) => {
            CommandResponse::error(labctrl_core::OperationResult::ErrorGeneric, message.clone())
        }
    };
    let ack = ChannelMessage::Ack(ChannelCommandAck {
        cid,
        response: ack_response,
    });
    if reply_to.send(ack).await.is_err() {
        return Err("failed to queue command ack".into());
    }
    result.map(|_| ())
}
