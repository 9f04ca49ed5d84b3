//! Operator-facing alerts for newly created notifications.

use anyhow::Result;
use tracing::info;

use crate::notifications::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopPermission {
    Granted,
    Denied,
}

/// Raises an out-of-band alert per new notification.
///
/// Permission is asked for once per session; `show` is only called after a grant.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait DesktopNotifier: Send + Sync {
    fn request_permission(&self) -> DesktopPermission;

    fn show(&self, notification: &Notification) -> Result<()>;
}

/// Announces new orders through the log.
pub struct LogDesktopNotifier;

impl DesktopNotifier for LogDesktopNotifier {
    fn request_permission(&self) -> DesktopPermission {
        DesktopPermission::Granted
    }

    fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            "New order #{} from {}: {:.2}",
            notification.order_id, notification.customer_name, notification.total_amount
        );
        Ok(())
    }
}

/// Never granted, so nothing is ever shown.
pub struct DisabledDesktopNotifier;

impl DesktopNotifier for DisabledDesktopNotifier {
    fn request_permission(&self) -> DesktopPermission {
        DesktopPermission::Denied
    }

    fn show(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}
