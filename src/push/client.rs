//! Reconnecting push client.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectPolicy;
use super::transport::{PushError, PushSession, PushTransport};
use crate::metrics;
use crate::notifications::{OrderEvent, OrderNotification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last connect or handshake failed. Transient: followed by `Disconnected`.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushStatus {
    pub state: ConnectionState,
    /// Reconnect attempts made since the last successful connect.
    pub reconnect_attempts: u32,
    /// Reconnect attempts are used up; the client will not try again.
    pub exhausted: bool,
}

impl PushStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for PushStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            exhausted: false,
        }
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
    Failed(PushError),
}

/// Keeps a push session open, decoding order payloads into [`OrderEvent::Pushed`].
///
/// Lost connections are retried per the [`ReconnectPolicy`]; once the attempts are
/// used up the client reports `exhausted` and `run` returns. Polling keeps the feed
/// current from then on.
pub struct PushClient {
    transport: Arc<dyn PushTransport>,
    endpoint: String,
    policy: ReconnectPolicy,
    status_tx: watch::Sender<PushStatus>,
}

impl PushClient {
    pub fn new(transport: Arc<dyn PushTransport>, endpoint: String, policy: ReconnectPolicy) -> Self {
        let (status_tx, _) = watch::channel(PushStatus::default());
        Self {
            transport,
            endpoint,
            policy,
            status_tx,
        }
    }

    pub fn status(&self) -> PushStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PushStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.status().reconnect_attempts
    }

    fn publish(&self, state: ConnectionState, reconnect_attempts: u32, exhausted: bool) {
        metrics::set_push_connected(state == ConnectionState::Connected);
        metrics::set_reconnect_attempts(reconnect_attempts);
        self.status_tx.send_replace(PushStatus {
            state,
            reconnect_attempts,
            exhausted,
        });
    }

    /// Runs until shutdown, until the event receiver goes away, or until reconnects
    /// are exhausted.
    pub async fn run(&self, events: mpsc::Sender<OrderEvent>, shutdown: CancellationToken) {
        let mut attempts: u32 = 0;
        info!(
            "Starting {} push client for {}",
            self.transport.name(),
            self.endpoint
        );

        loop {
            self.publish(ConnectionState::Connecting, attempts, false);

            let opened = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.publish(ConnectionState::Disconnected, attempts, false);
                    return;
                }
                opened = self.transport.open(&self.endpoint) => opened,
            };

            match opened {
                Ok(mut session) => {
                    attempts = 0;
                    self.publish(ConnectionState::Connected, attempts, false);
                    info!("Push channel connected");

                    match self.pump(session.as_mut(), &events, &shutdown).await {
                        SessionEnd::Shutdown => {
                            session.close().await;
                            self.publish(ConnectionState::Disconnected, attempts, false);
                            info!("Push client stopped");
                            return;
                        }
                        SessionEnd::Closed => warn!("Push channel closed by server"),
                        SessionEnd::Failed(e) => warn!("Push channel lost: {}", e),
                    }
                }
                Err(e) => {
                    metrics::record_push_connect_failure();
                    self.publish(ConnectionState::Failed, attempts, false);
                    warn!("Push connect attempt {} failed: {}", attempts, e);
                }
            }

            if !self.policy.should_retry(attempts) {
                error!(
                    "Giving up on push after {} reconnect attempts, relying on polling",
                    attempts
                );
                self.publish(ConnectionState::Disconnected, attempts, true);
                return;
            }

            self.publish(ConnectionState::Disconnected, attempts, false);
            let delay = self.policy.delay_for(attempts);
            debug!("Reconnecting push channel in {:?}", delay);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Push client stopped during backoff");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempts += 1;
        }
    }

    async fn pump(
        &self,
        session: &mut dyn PushSession,
        events: &mpsc::Sender<OrderEvent>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                next = session.next_payload() => next,
            };
            let payload = match next {
                Ok(Some(payload)) => payload,
                Ok(None) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Failed(e),
            };
            match serde_json::from_str::<OrderNotification>(&payload) {
                Ok(order) => {
                    debug!("Pushed order {}", order.order_id);
                    if events.send(OrderEvent::Pushed(order)).await.is_err() {
                        debug!("Order event receiver dropped, stopping push client");
                        return SessionEnd::Shutdown;
                    }
                }
                Err(e) => {
                    metrics::record_malformed_push();
                    warn!("Dropping malformed push message: {} - {}", e, payload);
                }
            }
        }
    }
}
