//! WebSocket transports for the order push channel.
//!
//! Two flavours are supported: a plain socket where every text frame is one JSON
//! payload, and STOMP over WebSocket subscribed to the order topic.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::stomp::{decode_frames, Command, Frame, FrameError};
use crate::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIPTION_ID: &str = "sub-0";

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("WebSocket connection failed: {0}")]
    Connect(String),
    #[error("STOMP handshake failed: {0}")]
    Handshake(String),
    #[error("STOMP protocol error: {0}")]
    Protocol(#[from] FrameError),
    #[error("broker reported an error: {0}")]
    Broker(String),
    #[error("connection error: {0}")]
    Connection(String),
}

/// Opens sessions against a push endpoint.
#[async_trait]
pub trait PushTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Connects and performs any protocol handshake. The returned session is ready
    /// to yield order payloads.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn PushSession>, PushError>;
}

/// A live push connection.
#[async_trait]
pub trait PushSession: Send {
    /// Next raw order payload. `Ok(None)` means the server closed the connection.
    async fn next_payload(&mut self) -> Result<Option<String>, PushError>;

    async fn close(&mut self);
}

async fn connect(endpoint: &str) -> Result<WsStream, PushError> {
    let (ws, _) = connect_async(endpoint)
        .await
        .map_err(|e| PushError::Connect(e.to_string()))?;
    Ok(ws)
}

/// Plain WebSocket: one JSON order per text frame.
pub struct NativeSocketTransport;

#[async_trait]
impl PushTransport for NativeSocketTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn open(&self, endpoint: &str) -> Result<Box<dyn PushSession>, PushError> {
        let ws = connect(endpoint).await?;
        info!("Connected to order push socket {}", endpoint);
        Ok(Box::new(NativeSession { ws }))
    }
}

struct NativeSession {
    ws: WsStream,
}

#[async_trait]
impl PushSession for NativeSession {
    async fn next_payload(&mut self) -> Result<Option<String>, PushError> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_string())),
                Ok(Message::Ping(data)) => {
                    self.ws
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| PushError::Connection(e.to_string()))?;
                }
                Ok(Message::Close(_)) => {
                    info!("Order push socket closed by server");
                    return Ok(None);
                }
                Ok(other) => debug!("Ignoring non-text push frame: {:?}", other),
                Err(e) => return Err(PushError::Connection(e.to_string())),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("Error closing push socket: {}", e);
        }
    }
}

/// STOMP 1.2 over WebSocket, subscribed to a single topic.
pub struct StompTransport {
    topic: String,
    heartbeat: Duration,
}

impl StompTransport {
    pub fn new(topic: impl Into<String>, heartbeat: Duration) -> Self {
        Self {
            topic: topic.into(),
            heartbeat,
        }
    }

    /// Outgoing heartbeat period once the broker's CONNECTED reply is known.
    /// The broker advertises `sx,sy`; we only send if both sides want beats.
    fn negotiated_heartbeat(&self, connected: &Frame) -> Option<Duration> {
        let ours = self.heartbeat.as_millis() as u64;
        if ours == 0 {
            return None;
        }
        let theirs = connected
            .get_header("heart-beat")
            .and_then(|hb| hb.split(',').nth(1))
            .and_then(|sy| sy.trim().parse::<u64>().ok())
            .unwrap_or(0);
        if theirs == 0 {
            return None;
        }
        Some(Duration::from_millis(ours.max(theirs)))
    }

    async fn handshake(&self, ws: &mut WsStream, host: &str) -> Result<Frame, PushError> {
        let connect = Frame::connect(host, self.heartbeat.as_millis() as u64);
        ws.send(Message::text(connect.encode()))
            .await
            .map_err(|e| PushError::Handshake(e.to_string()))?;

        while let Some(msg) = ws.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(PushError::Handshake(e.to_string())),
            };
            for frame in decode_frames(text.as_str()) {
                let frame = frame?;
                match frame.command {
                    Command::Connected => return Ok(frame),
                    Command::Error => {
                        let reason = frame.get_header("message").unwrap_or("no reason given");
                        return Err(PushError::Handshake(reason.to_string()));
                    }
                    other => debug!("Ignoring {} frame before CONNECTED", other),
                }
            }
        }
        Err(PushError::Handshake(
            "connection closed before CONNECTED".to_string(),
        ))
    }
}

#[async_trait]
impl PushTransport for StompTransport {
    fn name(&self) -> &'static str {
        "stomp"
    }

    async fn open(&self, endpoint: &str) -> Result<Box<dyn PushSession>, PushError> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|_| PushError::InvalidEndpoint(endpoint.to_string()))?;
        let host = uri
            .host()
            .ok_or_else(|| PushError::InvalidEndpoint(endpoint.to_string()))?
            .to_string();

        let mut ws = connect(endpoint).await?;
        let connected = self.handshake(&mut ws, &host).await?;

        let subscribe = Frame::subscribe(SUBSCRIPTION_ID, &self.topic);
        ws.send(Message::text(subscribe.encode()))
            .await
            .map_err(|e| PushError::Connection(e.to_string()))?;

        let heartbeat = self.negotiated_heartbeat(&connected).map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        info!(
            "STOMP session established on {}, subscribed to {}",
            endpoint, self.topic
        );

        Ok(Box::new(StompSession {
            ws,
            pending: VecDeque::new(),
            heartbeat,
        }))
    }
}

struct StompSession {
    ws: WsStream,
    pending: VecDeque<String>,
    heartbeat: Option<Interval>,
}

async fn next_beat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl StompSession {
    /// Queues MESSAGE bodies from one transport message. Undecodable frames are
    /// dropped without affecting the rest of the message.
    fn absorb(&mut self, text: &str) -> Result<(), PushError> {
        for frame in decode_frames(text) {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    metrics::record_malformed_push();
                    warn!("Dropping undecodable STOMP frame: {}", e);
                    continue;
                }
            };
            match frame.command {
                Command::Message => self.pending.push_back(frame.body),
                Command::Error => {
                    let reason = frame.get_header("message").unwrap_or("no reason given");
                    return Err(PushError::Broker(reason.to_string()));
                }
                other => debug!("Ignoring STOMP {} frame", other),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PushSession for StompSession {
    async fn next_payload(&mut self) -> Result<Option<String>, PushError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Ok(Some(payload));
            }
            tokio::select! {
                msg = self.ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.absorb(text.as_str())?,
                    Some(Ok(Message::Ping(data))) => {
                        self.ws
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| PushError::Connection(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("STOMP connection closed by server");
                        return Ok(None);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(PushError::Connection(e.to_string())),
                },
                _ = next_beat(&mut self.heartbeat) => {
                    self.ws
                        .send(Message::text("\n"))
                        .await
                        .map_err(|e| PushError::Connection(e.to_string()))?;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .ws
            .send(Message::text(Frame::disconnect().encode()))
            .await
        {
            debug!("Failed to send DISCONNECT: {}", e);
        }
        if let Err(e) = self.ws.close(None).await {
            debug!("Error closing STOMP socket: {}", e);
        }
    }
}
