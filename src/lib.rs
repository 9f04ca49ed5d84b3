//! Order Notifier Library
//!
//! Real-time new-order notifications for the storefront admin: a persisted,
//! deduplicated feed fed by a push channel with a polling fallback.

pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod polling;
pub mod push;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig, TransportKind};
pub use coordinator::{FeedState, NotificationCoordinator, NotificationSession, SessionParts};
pub use notifications::{Notification, NotificationStore, OrderEvent, OrderNotification};
pub use push::{ConnectionState, PushClient, PushStatus};
