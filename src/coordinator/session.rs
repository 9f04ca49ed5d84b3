//! Per-operator notification session.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::coordinator::NotificationCoordinator;
use super::desktop::{DesktopNotifier, DisabledDesktopNotifier, LogDesktopNotifier};
use super::state::FeedState;
use crate::config::{AppConfig, TransportKind};
use crate::notifications::{NotificationStore, SqliteKeyValueStore};
use crate::orders::{HttpOrderClient, OrderSource};
use crate::polling::{PollCadence, PollingReconciler};
use crate::push::{
    push_endpoint, NativeSocketTransport, PushClient, PushStatus, PushTransport, StompTransport,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Pre-built components for [`NotificationSession::start_with`].
pub struct SessionParts {
    pub store: NotificationStore,
    pub orders: Arc<dyn OrderSource>,
    pub desktop: Arc<dyn DesktopNotifier>,
    /// `None` runs on polling alone.
    pub push: Option<PushClient>,
    pub cadence: PollCadence,
}

/// Owns the store, coordinator, push client and their background tasks.
///
/// Dropping the session cancels the tasks; [`shutdown`](Self::shutdown) also waits
/// for them to finish.
pub struct NotificationSession {
    coordinator: Arc<NotificationCoordinator>,
    push: Option<Arc<PushClient>>,
    push_status: watch::Receiver<PushStatus>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NotificationSession {
    /// Builds every component from configuration and starts the session.
    /// Must be called from within a tokio runtime.
    pub fn start(config: &AppConfig) -> Result<Self> {
        let kv = SqliteKeyValueStore::new(&config.db_path)
            .with_context(|| format!("Failed to open notification state at {:?}", config.db_path))?;
        let store = NotificationStore::new(Arc::new(kv));
        let orders = HttpOrderClient::new(&config.backend_url, config.http_timeout_sec)?;

        let desktop: Arc<dyn DesktopNotifier> = if config.desktop.enabled {
            Arc::new(LogDesktopNotifier)
        } else {
            Arc::new(DisabledDesktopNotifier)
        };

        let push = if config.push.enabled {
            let endpoint = push_endpoint(&config.backend_url, &config.push.path)?;
            let transport: Arc<dyn PushTransport> = match config.push.transport {
                TransportKind::Stomp => Arc::new(StompTransport::new(
                    config.push.topic.clone(),
                    config.push.heartbeat(),
                )),
                TransportKind::Native => Arc::new(NativeSocketTransport),
            };
            Some(PushClient::new(
                transport,
                endpoint,
                config.push.reconnect_policy(),
            ))
        } else {
            info!("Push disabled, relying on polling only");
            None
        };

        Ok(Self::start_with(SessionParts {
            store,
            orders: Arc::new(orders),
            desktop,
            push,
            cadence: config.polling.cadence(),
        }))
    }

    /// Starts a session from already constructed parts.
    /// Must be called from within a tokio runtime.
    pub fn start_with(parts: SessionParts) -> Self {
        let shutdown = CancellationToken::new();
        let reconciler = PollingReconciler::new(parts.orders, parts.store.clone());
        let coordinator = Arc::new(NotificationCoordinator::new(
            parts.store,
            reconciler,
            parts.desktop,
        ));
        coordinator.request_desktop_permission();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut tasks = Vec::new();

        let push = parts.push.map(Arc::new);
        let push_status = match &push {
            Some(client) => {
                let status = client.subscribe();
                let client = client.clone();
                let token = shutdown.clone();
                tasks.push(tokio::spawn(async move {
                    client.run(events_tx, token).await;
                }));
                status
            }
            None => {
                // Sender dropped right away: status stays disconnected forever
                let (_, status) = watch::channel(PushStatus::default());
                status
            }
        };

        tasks.push(tokio::spawn(coordinator.clone().run(
            events_rx,
            push_status.clone(),
            parts.cadence,
            shutdown.clone(),
        )));

        info!("Notification session started");
        Self {
            coordinator,
            push,
            push_status,
            shutdown,
            tasks,
        }
    }

    pub fn state(&self) -> FeedState {
        self.coordinator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.coordinator.subscribe()
    }

    pub fn mark_as_read(&self, id: &str) -> bool {
        self.coordinator.mark_as_read(id)
    }

    pub fn mark_all_as_read(&self) {
        self.coordinator.mark_all_as_read()
    }

    pub fn delete_notification(&self, id: &str) -> bool {
        self.coordinator.delete(id)
    }

    pub fn clear_all(&self) {
        self.coordinator.clear_all()
    }

    /// Manual refresh; returns how many notifications were added.
    pub async fn check_for_new_orders(&self) -> usize {
        self.coordinator.check_for_new_orders().await
    }

    pub fn is_connected(&self) -> bool {
        self.push_status().is_connected()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.push_status().reconnect_attempts
    }

    pub fn push_status(&self) -> PushStatus {
        match &self.push {
            Some(client) => client.status(),
            None => *self.push_status.borrow(),
        }
    }

    /// Stops polling and push, closing the push connection, and waits for both tasks.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Notification task ended abnormally: {}", e);
            }
        }
        info!("Notification session stopped");
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
