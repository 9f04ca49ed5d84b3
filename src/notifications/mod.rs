//! Order notifications: models and their persistent store

mod kv;
mod models;
mod schema;
mod store;

pub use kv::{KeyValueStore, SqliteKeyValueStore};
pub use models::{
    next_notification_id, normalize_feed, parse_timestamp, EventSource, Notification,
    NotificationType, OrderEvent, OrderNotification, MAX_NOTIFICATIONS,
};
pub use store::{
    NotificationStore, DISMISSED_KEY, HIGH_WATER_MARK_KEY, MAX_DISMISSED, NOTIFICATIONS_KEY,
};
