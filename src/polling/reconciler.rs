//! High-water-mark diffing of the backend order list.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::notifications::{Notification, NotificationStore};
use crate::orders::{Order, OrderSource};

/// Detects orders created since the last poll by comparing ids against the
/// persisted high-water mark.
///
/// Fetching and reconciling are separate steps so callers can serialize the
/// store mutation without holding anything across the network call.
pub struct PollingReconciler {
    source: Arc<dyn OrderSource>,
    store: NotificationStore,
}

impl PollingReconciler {
    pub fn new(source: Arc<dyn OrderSource>, store: NotificationStore) -> Self {
        Self { source, store }
    }

    /// Fetches the order list, or `None` if the fetch failed (already logged).
    pub async fn fetch(&self) -> Option<Vec<Order>> {
        match self.source.list_orders().await {
            Ok(orders) => {
                debug!("Fetched {} orders", orders.len());
                Some(orders)
            }
            Err(e) => {
                metrics::record_poll_failure();
                warn!("Order poll failed, will retry on next tick: {:#}", e);
                None
            }
        }
    }

    /// Advances the high-water mark past `orders` and returns candidate notifications
    /// for the ones above it, newest order first.
    ///
    /// The first ever reconciliation only seeds the mark, so orders that existed
    /// before the operator started watching are never announced.
    pub fn reconcile(&self, orders: Vec<Order>) -> Vec<Notification> {
        let Some(max_id) = orders.iter().map(|o| o.id).max() else {
            if self.store.high_water_mark().is_none() {
                self.store.set_high_water_mark(0);
            }
            return Vec::new();
        };

        let Some(mark) = self.store.high_water_mark() else {
            info!("Seeding order high-water mark at {}", max_id);
            self.store.set_high_water_mark(max_id);
            return Vec::new();
        };

        let mut fresh: Vec<Order> = orders.into_iter().filter(|o| o.id > mark).collect();
        if fresh.is_empty() {
            return Vec::new();
        }
        fresh.sort_by(|a, b| b.id.cmp(&a.id));

        // Everything in `fresh` is above `mark`, so this only ever moves forward
        self.store.set_high_water_mark(max_id);
        info!(
            "Found {} new orders above high-water mark {} (now {})",
            fresh.len(),
            mark,
            max_id
        );

        fresh.iter().map(Notification::from_order).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::SqliteKeyValueStore;
    use crate::orders::MockOrderSource;

    fn order(id: i64) -> Order {
        Order {
            id,
            customer_name: Some(format!("Customer {}", id)),
            customer_email: None,
            customer_phone: None,
            total_amount: Some(id as f64),
            created_at: Some(format!("2024-06-01T12:{:02}:00", id % 60)),
        }
    }

    fn orders(ids: &[i64]) -> Vec<Order> {
        ids.iter().copied().map(order).collect()
    }

    fn make_store() -> NotificationStore {
        NotificationStore::new(Arc::new(SqliteKeyValueStore::in_memory().unwrap()))
    }

    fn reconciler_with(source: MockOrderSource, store: &NotificationStore) -> PollingReconciler {
        PollingReconciler::new(Arc::new(source), store.clone())
    }

    #[test]
    fn test_first_poll_seeds_mark_without_notifications() {
        let store = make_store();
        let reconciler = reconciler_with(MockOrderSource::new(), &store);

        let candidates = reconciler.reconcile(orders(&[5, 7, 9]));

        assert!(candidates.is_empty());
        assert_eq!(store.high_water_mark(), Some(9));
    }

    #[test]
    fn test_new_orders_above_mark_become_candidates() {
        let store = make_store();
        store.set_high_water_mark(9);
        let reconciler = reconciler_with(MockOrderSource::new(), &store);

        let candidates = reconciler.reconcile(orders(&[5, 7, 9, 10, 11]));

        let ids: Vec<i64> = candidates.iter().map(|n| n.order_id).collect();
        assert_eq!(ids, vec![11, 10]);
        assert!(candidates.iter().all(|n| !n.read));
        assert_eq!(store.high_water_mark(), Some(11));
    }

    #[test]
    fn test_empty_list_initializes_mark_to_zero() {
        let store = make_store();
        let reconciler = reconciler_with(MockOrderSource::new(), &store);

        assert!(reconciler.reconcile(Vec::new()).is_empty());
        assert_eq!(store.high_water_mark(), Some(0));

        // Orders arriving after an empty first fetch are genuinely new
        let candidates = reconciler.reconcile(orders(&[1, 2]));
        assert_eq!(candidates.len(), 2);
        assert_eq!(store.high_water_mark(), Some(2));
    }

    #[test]
    fn test_empty_list_keeps_existing_mark() {
        let store = make_store();
        store.set_high_water_mark(30);
        let reconciler = reconciler_with(MockOrderSource::new(), &store);

        reconciler.reconcile(Vec::new());

        assert_eq!(store.high_water_mark(), Some(30));
    }

    #[test]
    fn test_mark_never_decreases() {
        let store = make_store();
        store.set_high_water_mark(20);
        let reconciler = reconciler_with(MockOrderSource::new(), &store);

        // Backend returning only older orders (e.g. after deletions) must not lower the mark
        assert!(reconciler.reconcile(orders(&[3, 4])).is_empty());
        assert_eq!(store.high_water_mark(), Some(20));

        let sequence = [vec![21], vec![], vec![5], vec![22, 25], vec![24]];
        let mut last = 20;
        for ids in sequence {
            reconciler.reconcile(orders(&ids));
            let mark = store.high_water_mark().unwrap();
            assert!(mark >= last);
            last = mark;
        }
        assert_eq!(last, 25);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_mark_unchanged() {
        let store = make_store();
        store.set_high_water_mark(9);
        let mut source = MockOrderSource::new();
        source
            .expect_list_orders()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        let reconciler = reconciler_with(source, &store);

        assert!(reconciler.fetch().await.is_none());
        assert_eq!(store.high_water_mark(), Some(9));
    }

    #[tokio::test]
    async fn test_fetch_then_reconcile() {
        let store = make_store();
        store.set_high_water_mark(1);
        let mut source = MockOrderSource::new();
        source
            .expect_list_orders()
            .times(1)
            .returning(|| Ok(orders(&[1, 2, 3])));
        let reconciler = reconciler_with(source, &store);

        let orders = reconciler.fetch().await.unwrap();
        let candidates = reconciler.reconcile(orders);

        assert_eq!(candidates.len(), 2);
        assert_eq!(store.high_water_mark(), Some(3));
    }
}
