//! Notification coordination: the merged feed and the session that drives it.

#[allow(clippy::module_inception)]
mod coordinator;
mod desktop;
mod session;
mod state;

pub use coordinator::NotificationCoordinator;
#[cfg(any(test, feature = "mock"))]
pub use desktop::MockDesktopNotifier;
pub use desktop::{DesktopNotifier, DesktopPermission, DisabledDesktopNotifier, LogDesktopNotifier};
pub use session::{NotificationSession, SessionParts};
pub use state::FeedState;
