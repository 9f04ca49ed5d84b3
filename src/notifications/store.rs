//! Persistent notification store.
//!
//! Every operation goes straight to the backing [`KeyValueStore`]; nothing is cached, so
//! a freshly constructed store always observes what another instance last wrote.
//! Failures are logged and absorbed here: notifications are best-effort and a broken
//! slot must never take the feed down.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::kv::KeyValueStore;
use super::models::{normalize_feed, Notification};
use crate::metrics;

pub const NOTIFICATIONS_KEY: &str = "order_notifications";
pub const HIGH_WATER_MARK_KEY: &str = "last_order_id";
pub const DISMISSED_KEY: &str = "dismissed_order_ids";

/// Upper bound on remembered dismissals; the smallest order ids are forgotten first.
pub const MAX_DISMISSED: usize = 200;

#[derive(Clone)]
pub struct NotificationStore {
    kv: Arc<dyn KeyValueStore>,
}

impl NotificationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Returns the persisted feed, newest first. Missing or corrupt state reads as empty.
    pub fn load(&self) -> Vec<Notification> {
        match self.try_load() {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!("Failed to load notifications, starting empty: {:#}", e);
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<Notification>> {
        let Some(raw) = self.kv.get(NOTIFICATIONS_KEY)? else {
            return Ok(Vec::new());
        };
        let parsed: Vec<Notification> =
            serde_json::from_str(&raw).context("Failed to parse persisted notifications")?;
        Ok(normalize_feed(parsed))
    }

    /// Replaces the persisted feed with `notifications`, deduplicated, sorted and capped.
    /// Returns the normalized feed, which is what was written unless persistence failed.
    pub fn save(&self, notifications: Vec<Notification>) -> Vec<Notification> {
        let feed = normalize_feed(notifications);
        let result = serde_json::to_string(&feed)
            .context("Failed to serialize notifications")
            .and_then(|json| self.kv.set(NOTIFICATIONS_KEY, &json));
        match result {
            Ok(()) => debug!("Persisted {} notifications", feed.len()),
            Err(e) => {
                metrics::record_persistence_failure();
                error!("Failed to persist notifications: {:#}", e);
            }
        }
        feed
    }

    /// The polling high-water mark, or `None` if it was never seeded or is unreadable.
    pub fn high_water_mark(&self) -> Option<i64> {
        let raw = match self.kv.get(HIGH_WATER_MARK_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read high-water mark: {:#}", e);
                return None;
            }
        };
        match raw.trim().parse::<i64>() {
            Ok(mark) => Some(mark),
            Err(e) => {
                warn!("Ignoring corrupt high-water mark {:?}: {}", raw, e);
                None
            }
        }
    }

    pub fn set_high_water_mark(&self, mark: i64) {
        if let Err(e) = self.kv.set(HIGH_WATER_MARK_KEY, &mark.to_string()) {
            metrics::record_persistence_failure();
            error!("Failed to persist high-water mark {}: {:#}", mark, e);
        }
    }

    /// Order ids the operator deleted or cleared. Missing or corrupt state reads as empty.
    pub fn dismissed_orders(&self) -> BTreeSet<i64> {
        let parsed = self.kv.get(DISMISSED_KEY).and_then(|raw| match raw {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse dismissed orders"),
            None => Ok(BTreeSet::new()),
        });
        match parsed {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to load dismissed orders: {:#}", e);
                BTreeSet::new()
            }
        }
    }

    /// Remembers `order_ids` as dismissed so neither source can bring them back.
    ///
    /// Ids at or below the high-water mark are dropped: polling never yields them again.
    pub fn dismiss(&self, order_ids: impl IntoIterator<Item = i64>) {
        let mut dismissed = self.dismissed_orders();
        dismissed.extend(order_ids);
        if let Some(mark) = self.high_water_mark() {
            dismissed = dismissed.split_off(&mark.saturating_add(1));
        }
        while dismissed.len() > MAX_DISMISSED {
            dismissed.pop_first();
        }

        let result = serde_json::to_string(&dismissed)
            .context("Failed to serialize dismissed orders")
            .and_then(|json| self.kv.set(DISMISSED_KEY, &json));
        if let Err(e) = result {
            metrics::record_persistence_failure();
            error!("Failed to persist dismissed orders: {:#}", e);
        }
    }

    /// Drops the persisted feed. The high-water mark is left alone.
    pub fn clear(&self) {
        if let Err(e) = self.kv.remove(NOTIFICATIONS_KEY) {
            metrics::record_persistence_failure();
            error!("Failed to clear notifications: {:#}", e);
        }
    }
}
