//! Notification data models

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::orders::Order;

/// Maximum number of notifications kept in the feed.
pub const MAX_NOTIFICATIONS: usize = 50;

/// Notification type enum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[default]
    Order,
}

/// A surfaced new-order event, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub order_id: i64,
    pub customer_name: String,
    pub total_amount: f64,
    pub created_at: String,
    pub read: bool,
    #[serde(rename = "type", default)]
    pub notification_type: NotificationType,
}

/// Payload pushed by the broker on the order topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotification {
    pub order_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A new-order event from either delivery path.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Pushed(OrderNotification),
    Polled(Vec<Notification>),
}

/// Where a notification candidate came from; used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Push,
    Poll,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Push => "push",
            EventSource::Poll => "poll",
        }
    }
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Generates a notification id from a clock reading that never repeats or goes backwards
/// within the process, suffixed with the order id.
pub fn next_notification_id(order_id: i64) -> String {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_ID_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1);
        match LAST_ID_MILLIS.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return format!("{}-{}", next, order_id),
            Err(actual) => prev = actual,
        }
    }
}

/// Parses the backend's `createdAt` representation.
///
/// Accepts RFC 3339 and offset-less ISO timestamps (taken as UTC), with or without
/// fractional seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl Notification {
    fn new(order_id: i64, customer_name: String, total_amount: f64, created_at: String) -> Self {
        Self {
            id: next_notification_id(order_id),
            order_id,
            customer_name,
            total_amount,
            created_at,
            read: false,
            notification_type: NotificationType::Order,
        }
    }

    pub fn from_order(order: &Order) -> Self {
        Self::new(
            order.id,
            order.customer_name.clone().unwrap_or_default(),
            order.total_amount.unwrap_or_default(),
            order.created_at.clone().unwrap_or_default(),
        )
    }

    pub fn from_push(payload: &OrderNotification) -> Self {
        Self::new(
            payload.order_id,
            payload.customer_name.clone().unwrap_or_default(),
            payload.total_amount.unwrap_or_default(),
            payload
                .created_at
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
        )
    }

    /// Milliseconds since epoch of `created_at`; unparseable values sort as the oldest.
    pub fn created_at_millis(&self) -> i64 {
        parse_timestamp(&self.created_at)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(i64::MIN)
    }
}

/// Deduplicates by order id (first occurrence wins), sorts newest first and drops
/// everything past [`MAX_NOTIFICATIONS`], so the oldest entries are the ones evicted.
pub fn normalize_feed(notifications: Vec<Notification>) -> Vec<Notification> {
    let mut seen = HashSet::new();
    let mut feed: Vec<Notification> = notifications
        .into_iter()
        .filter(|n| seen.insert(n.order_id))
        .collect();
    feed.sort_by_cached_key(|n| Reverse((n.created_at_millis(), n.order_id)));
    feed.truncate(MAX_NOTIFICATIONS);
    feed
}
