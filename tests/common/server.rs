//! Fake storefront backend
//!
//! Serves `GET /orders` from shared state and a `/ws` push endpoint that speaks
//! either STOMP or plain one-payload-per-frame WebSocket. Tests publish orders and
//! inspect the frames the client sent.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use super::constants::ORDERS_TOPIC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    Stomp,
    Native,
}

#[derive(Clone)]
struct BackendState {
    mode: PushMode,
    orders: Arc<Mutex<Vec<Value>>>,
    orders_failing: Arc<AtomicBool>,
    payloads: broadcast::Sender<String>,
    raw_frames: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    subscribers: Arc<AtomicUsize>,
    received_frames: Arc<Mutex<Vec<String>>>,
}

/// Fake backend instance. Shuts down when dropped.
pub struct FakeBackend {
    /// Base URL for the backend (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    state: BackendState,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeBackend {
    /// Spawns the backend on a random port, serving `orders` from `GET /orders`.
    pub async fn spawn(mode: PushMode, orders: Vec<Value>) -> Self {
        let (payloads, _) = broadcast::channel(64);
        let (raw_frames, _) = broadcast::channel(16);
        let (kick, _) = broadcast::channel(4);
        let state = BackendState {
            mode,
            orders: Arc::new(Mutex::new(orders)),
            orders_failing: Arc::new(AtomicBool::new(false)),
            payloads,
            raw_frames,
            kick,
            subscribers: Arc::new(AtomicUsize::new(0)),
            received_frames: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/orders", get(list_orders))
            .route("/ws", get(ws_upgrade))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Fake backend failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn add_order(&self, order: Value) {
        self.state.orders.lock().unwrap().push(order);
    }

    /// Makes `GET /orders` answer 500 until turned off again.
    pub fn set_orders_failing(&self, failing: bool) {
        self.state.orders_failing.store(failing, Ordering::SeqCst);
    }

    /// Sends a raw payload to every subscribed push client.
    pub fn publish(&self, payload: &str) {
        let _ = self.state.payloads.send(payload.to_string());
    }

    /// Sends `text` verbatim as one WebSocket text message to every subscribed client.
    pub fn send_raw(&self, text: &str) {
        let _ = self.state.raw_frames.send(text.to_string());
    }

    /// Drops every open push connection from the server side.
    pub fn kick_push_clients(&self) {
        let _ = self.state.kick.send(());
    }

    pub fn subscribers(&self) -> usize {
        self.state.subscribers.load(Ordering::SeqCst)
    }

    /// Text frames received from push clients, in arrival order.
    pub fn received_frames(&self) -> Vec<String> {
        self.state.received_frames.lock().unwrap().clone()
    }
}

async fn list_orders(State(state): State<BackendState>) -> Response {
    if state.orders_failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    let orders = state.orders.lock().unwrap().clone();
    Json(orders).into_response()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<BackendState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn stomp_message(payload: &str, seq: usize) -> String {
    format!(
        "MESSAGE\ndestination:{}\nmessage-id:{}\nsubscription:sub-0\ncontent-type:application/json\n\n{}\0",
        ORDERS_TOPIC, seq, payload
    )
}

async fn handle_socket(mut socket: WebSocket, state: BackendState) {
    let mut payloads = state.payloads.subscribe();
    let mut raw_frames = state.raw_frames.subscribe();
    let mut kick = state.kick.subscribe();
    // Plain sockets are subscribed as soon as they connect
    let mut subscribed = state.mode == PushMode::Native;
    if subscribed {
        state.subscribers.fetch_add(1, Ordering::SeqCst);
    }
    let mut seq = 0;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                state.received_frames.lock().unwrap().push(text.clone());
                if state.mode != PushMode::Stomp {
                    continue;
                }
                if text.starts_with("CONNECT") {
                    let connected = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0";
                    if socket.send(Message::Text(connected.into())).await.is_err() {
                        break;
                    }
                } else if text.starts_with("SUBSCRIBE") && !subscribed {
                    subscribed = true;
                    state.subscribers.fetch_add(1, Ordering::SeqCst);
                } else if text.starts_with("DISCONNECT") {
                    break;
                }
            }
            payload = payloads.recv(), if subscribed => {
                let payload = match payload {
                    Ok(payload) => payload,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                seq += 1;
                let frame = match state.mode {
                    PushMode::Stomp => stomp_message(&payload, seq),
                    PushMode::Native => payload,
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            raw = raw_frames.recv(), if subscribed => {
                let Ok(raw) = raw else { continue };
                if socket.send(Message::Text(raw.into())).await.is_err() {
                    break;
                }
            }
            _ = kick.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    if subscribed {
        state.subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}
