//! Persistent-channel half of the remote client.
//!
//! Grounded on `api.py`'s `__websocket_handler_task`: a loop that opens a
//! connection, performs the `{"token": ...}` handshake, then reads frames
//! until the socket closes, after which it reconnects. `websocket_command`'s
//! cid-keyed wait becomes a `oneshot` per call instead of a polled
//! `websocket_command_status` dict, and `handle_websocket_message`'s
//! opportunistic `self.position`/`self.parameter` updates become writes
//! into the shared cache in `crate::client`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use labctrl_core::{ChannelHandshake, ChannelMessage, CommandResponse, UpdateEvent};

use crate::cache::ParameterCache;

/// How long to wait before retrying a failed or closed connection.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("channel closed before a reply arrived")]
    Closed,
    #[error("waiting for a reply timed out")]
    TimedOut,
}

struct OutboundFrame {
    cid: Option<u64>,
    text: String,
    reply: Option<oneshot::Sender<CommandResponse>>,
}

/// Owns one persistent channel connection and reconnects it automatically.
/// Mirrors `api.py`'s single `websocket_connection` field plus its handler
/// thread, but keeps the handler as a spawned task joined by `stop`.
pub struct ChannelClient {
    outbound: mpsc::Sender<OutboundFrame>,
    next_cid: AtomicU64,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelClient {
    /// Starts the reconnect loop in the background. `token` is read fresh
    /// on every (re)connection attempt so a token refreshed by the auth
    /// watchdog takes effect on the next reconnect without restarting the
    /// client.
    pub fn start(url: String, token: Arc<RwLock<String>>, cache: ParameterCache) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundFrame>(32);
        let running = Arc::new(AtomicBool::new(true));
        let pending = Arc::new(std::sync::Mutex::new(HashMap::<u64, oneshot::Sender<CommandResponse>>::new()));

        let task_running = running.clone();
        let handle = tokio::spawn(run_loop(url, token, outbound_rx, pending, cache, task_running));

        Self {
            outbound: outbound_tx,
            next_cid: AtomicU64::new(1),
            running,
            handle: Some(handle),
        }
    }

    /// Sends a command and waits for its ack. Equivalent to
    /// `websocket_command(..., timeout=...)` with a numeric timeout.
    pub async fn command(
        &self,
        operation: &(impl serde::Serialize + ?Sized),
        timeout: Duration,
    ) -> Result<CommandResponse, ChannelError> {
        let cid = self.next_cid.fetch_add(1, Ordering::Relaxed);
        let mut value = serde_json::to_value(operation).expect("operation always serializes");
        if let serde_json::Value::Object(ref mut map) = value {
            map.insert("cid".to_string(), serde_json::json!(cid));
        }
        let text = value.to_string();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.outbound
            .send(OutboundFrame {
                cid: Some(cid),
                text,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ChannelError::NotConnected)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::TimedOut),
        }
    }

    /// Sends a command without waiting for a reply, mirroring
    /// `websocket_command` called with `timeout=None`.
    pub async fn command_fire_and_forget(
        &self,
        operation: &(impl serde::Serialize + ?Sized),
    ) -> Result<(), ChannelError> {
        let text = serde_json::to_string(operation).expect("operation always serializes");
        self.outbound
            .send(OutboundFrame {
                cid: None,
                text,
                reply: None,
            })
            .await
            .map_err(|_| ChannelError::NotConnected)
    }

    /// Signals the reconnect loop to stop and joins it.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn run_loop(
    url: String,
    token: Arc<RwLock<String>>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    pending: Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>>,
    cache: ParameterCache,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let current_token = token.read().await.clone();
        let connection = match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(err) => {
                warn!(%err, "channel connect failed, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        let (mut sink, mut stream) = connection.split();
        let handshake = serde_json::to_string(&ChannelHandshake { token: current_token }).unwrap();
        if sink.send(Message::Text(handshake)).await.is_err() {
            tokio::time::sleep(RECONNECT_DELAY).await;
            continue;
        }
        match stream.next().await {
            Some(Ok(Message::Text(_))) => info!("channel handshake acknowledged"),
            _ => {
                warn!("channel handshake failed or connection closed immediately");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        }

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        running.store(false, Ordering::SeqCst);
                        break;
                    };
                    if let (Some(cid), Some(reply)) = (frame.cid, frame.reply) {
                        pending.lock().unwrap().insert(cid, reply);
                    }
                    if sink.send(Message::Text(frame.text)).await.is_err() {
                        break;
                    }
                }
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => handle_incoming(&text, &pending, &cache).await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(err)) => {
                            warn!(%err, "channel read error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!("channel disconnected, clearing pending replies");
        pending.lock().unwrap().clear();
        if running.load(Ordering::SeqCst) {
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

async fn handle_incoming(
    text: &str,
    pending: &std::sync::Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>,
    cache: &ParameterCache,
) {
    let parsed: ChannelMessage = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(err) => {
            warn!(%err, "non-JSON or unrecognized channel message");
            return;
        }
    };
    match parsed {
        ChannelMessage::Ack(ack) => {
            if let Some(sender) = pending.lock().unwrap().remove(&ack.cid) {
                let _ = sender.send(ack.response);
            }
        }
        ChannelMessage::Update(event) => apply_update(event, cache).await,
    }
}

async fn apply_update(event: UpdateEvent, cache: &ParameterCache) {
    match event {
        UpdateEvent::ParameterChanged { name, value } => cache.set(&name, value).await,
        UpdateEvent::PositionReached { value } => cache.set("position", value).await,
        UpdateEvent::Sample { name, value, .. } => cache.set(&name, value).await,
    }
}
