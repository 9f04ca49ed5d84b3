//! Merges push and poll events into the persisted feed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::desktop::{DesktopNotifier, DesktopPermission};
use super::state::FeedState;
use crate::metrics;
use crate::notifications::{EventSource, Notification, NotificationStore, OrderEvent, OrderNotification};
use crate::orders::Order;
use crate::polling::{PollCadence, PollingReconciler};
use crate::push::PushStatus;

/// Order list fetch started by a poll tick, `None` output when it failed.
type PendingFetch = BoxFuture<'static, Option<Vec<Order>>>;

async fn poll_outcome(in_flight: &mut Option<PendingFetch>) -> Option<Vec<Order>> {
    match in_flight {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}

/// Single writer of the notification feed.
///
/// Every read-modify-write of the store happens under `mutation_lock`, which is only
/// ever held across synchronous code. Network fetches happen before the lock is
/// taken, so a slow backend never blocks operator actions.
pub struct NotificationCoordinator {
    store: NotificationStore,
    reconciler: PollingReconciler,
    desktop: Arc<dyn DesktopNotifier>,
    desktop_permission: OnceLock<DesktopPermission>,
    state_tx: watch::Sender<FeedState>,
    mutation_lock: Mutex<()>,
}

impl NotificationCoordinator {
    pub fn new(
        store: NotificationStore,
        reconciler: PollingReconciler,
        desktop: Arc<dyn DesktopNotifier>,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState::from_feed(store.load()));
        Self {
            store,
            reconciler,
            desktop,
            desktop_permission: OnceLock::new(),
            state_tx,
            mutation_lock: Mutex::new(()),
        }
    }

    /// Current feed, read from the store rather than the last published snapshot.
    pub fn state(&self) -> FeedState {
        FeedState::from_feed(self.store.load())
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    /// Asks the desktop notifier for permission on first call; later calls return the
    /// cached answer.
    pub fn request_desktop_permission(&self) -> DesktopPermission {
        *self.desktop_permission.get_or_init(|| {
            let permission = self.desktop.request_permission();
            info!("Desktop notification permission: {:?}", permission);
            permission
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a panic elsewhere cannot leave it inconsistent
        self.mutation_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, feed: Vec<Notification>) {
        let state = FeedState::from_feed(feed);
        metrics::set_unread(state.unread_count);
        self.state_tx.send_replace(state);
    }

    /// Adds candidates whose order is neither in the feed nor dismissed. Caller holds the lock.
    /// Returns the notifications that made it into the persisted feed.
    fn merge_locked(&self, candidates: Vec<Notification>, source: EventSource) -> Vec<Notification> {
        let existing = self.store.load();
        let dismissed = self.store.dismissed_orders();
        let mut known: HashSet<i64> = existing.iter().map(|n| n.order_id).collect();

        let mut added = Vec::new();
        for candidate in candidates {
            if dismissed.contains(&candidate.order_id) {
                debug!("Order {} was dismissed, skipping", candidate.order_id);
            } else if known.insert(candidate.order_id) {
                added.push(candidate);
            } else {
                metrics::record_duplicate(source.as_str());
                debug!(
                    "Order {} from {} already in feed, skipping",
                    candidate.order_id,
                    source.as_str()
                );
            }
        }
        if added.is_empty() {
            return added;
        }

        let mut merged = added.clone();
        merged.extend(existing);
        let feed = self.store.save(merged);

        // A candidate older than everything in a full feed is evicted straight away
        let kept: HashSet<&str> = feed.iter().map(|n| n.id.as_str()).collect();
        added.retain(|n| kept.contains(n.id.as_str()));

        metrics::record_created(source.as_str(), added.len());
        info!(
            "Added {} notification(s) from {}, feed now holds {}",
            added.len(),
            source.as_str(),
            feed.len()
        );
        self.publish(feed);
        added
    }

    fn announce(&self, added: &[Notification]) {
        if self.desktop_permission.get() != Some(&DesktopPermission::Granted) {
            return;
        }
        for notification in added {
            if let Err(e) = self.desktop.show(notification) {
                warn!(
                    "Desktop notification for order {} failed: {:#}",
                    notification.order_id, e
                );
            }
        }
    }

    /// Returns true if the pushed order was new to the feed.
    pub fn handle_push_event(&self, payload: OrderNotification) -> bool {
        let candidate = Notification::from_push(&payload);
        let added = {
            let _guard = self.lock();
            self.merge_locked(vec![candidate], EventSource::Push)
        };
        self.announce(&added);
        !added.is_empty()
    }

    /// Returns how many of the polled candidates were new to the feed.
    pub fn handle_poll_result(&self, candidates: Vec<Notification>) -> usize {
        if candidates.is_empty() {
            return 0;
        }
        let added = {
            let _guard = self.lock();
            self.merge_locked(candidates, EventSource::Poll)
        };
        self.announce(&added);
        added.len()
    }

    pub fn handle_event(&self, event: OrderEvent) -> usize {
        match event {
            OrderEvent::Pushed(payload) => usize::from(self.handle_push_event(payload)),
            OrderEvent::Polled(candidates) => self.handle_poll_result(candidates),
        }
    }

    /// Runs one reconciliation pass against the backend and merges what it finds.
    pub async fn check_for_new_orders(&self) -> usize {
        match self.reconciler.fetch().await {
            Some(orders) => self.apply_fetched(orders),
            None => 0,
        }
    }

    /// Reconciles an already fetched order list and merges the new orders.
    fn apply_fetched(&self, orders: Vec<Order>) -> usize {
        let added = {
            let _guard = self.lock();
            let candidates = self.reconciler.reconcile(orders);
            if candidates.is_empty() {
                return 0;
            }
            self.merge_locked(candidates, EventSource::Poll)
        };
        self.announce(&added);
        added.len()
    }

    /// Returns false if no notification has this id.
    pub fn mark_as_read(&self, id: &str) -> bool {
        let _guard = self.lock();
        let mut feed = self.store.load();
        let Some(notification) = feed.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if !notification.read {
            notification.read = true;
            let feed = self.store.save(feed);
            self.publish(feed);
        }
        true
    }

    pub fn mark_all_as_read(&self) {
        let _guard = self.lock();
        let mut feed = self.store.load();
        if feed.iter().all(|n| n.read) {
            return;
        }
        for notification in feed.iter_mut() {
            notification.read = true;
        }
        let feed = self.store.save(feed);
        self.publish(feed);
    }

    /// Removes one notification and remembers its order as dismissed, so a later poll
    /// cannot bring it back. The high-water mark is not touched.
    pub fn delete(&self, id: &str) -> bool {
        let _guard = self.lock();
        let mut feed = self.store.load();
        let Some(index) = feed.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = feed.remove(index);
        self.store.dismiss([removed.order_id]);

        let feed = self.store.save(feed);
        debug!("Deleted notification for order {}", removed.order_id);
        self.publish(feed);
        true
    }

    /// Empties the feed. The high-water mark is kept and the cleared orders are
    /// remembered as dismissed.
    pub fn clear_all(&self) {
        let _guard = self.lock();
        let cleared = self.store.load();
        self.store.dismiss(cleared.iter().map(|n| n.order_id));
        self.store.clear();
        self.publish(Vec::new());
    }

    /// Event loop: applies incoming order events and runs poll ticks, fast while push
    /// is down and slow while it is up. Losing push pulls the next poll forward.
    ///
    /// The order fetch runs alongside the loop, so pushed events keep flowing while
    /// the backend is slow. A tick that finds a fetch still running is skipped.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<OrderEvent>,
        mut push_status: watch::Receiver<PushStatus>,
        cadence: PollCadence,
        shutdown: CancellationToken,
    ) {
        let mut next_poll = Instant::now() + cadence.initial_delay;
        let mut in_flight: Option<PendingFetch> = None;
        let mut events_open = true;
        let mut status_open = true;
        info!(
            "Notification coordinator started (poll every {:?} without push, {:?} with)",
            cadence.fast, cadence.slow
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                _ = tokio::time::sleep_until(next_poll) => {
                    if in_flight.is_some() {
                        debug!("Previous order poll still running, skipping tick");
                    } else {
                        let this = self.clone();
                        in_flight = Some(async move { this.reconciler.fetch().await }.boxed());
                    }
                    let connected = push_status.borrow().is_connected();
                    next_poll = Instant::now() + cadence.interval(connected);
                }

                fetched = poll_outcome(&mut in_flight) => {
                    in_flight = None;
                    if let Some(orders) = fetched {
                        self.apply_fetched(orders);
                    }
                }

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => {
                        debug!("Order event channel closed");
                        events_open = false;
                    }
                },

                changed = push_status.changed(), if status_open => {
                    if changed.is_err() {
                        status_open = false;
                        continue;
                    }
                    let status = *push_status.borrow_and_update();
                    if !status.is_connected() {
                        let fast_deadline = Instant::now() + cadence.fast;
                        if fast_deadline < next_poll {
                            next_poll = fast_deadline;
                        }
                    }
                    debug!("Push status changed: {:?}", status);
                }
            }
        }

        info!("Notification coordinator stopped");
    }
}
