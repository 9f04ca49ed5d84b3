use crate::notifications::Notification;

/// Snapshot of the feed as published to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl FeedState {
    pub fn from_feed(notifications: Vec<Notification>) -> Self {
        let unread_count = notifications.iter().filter(|n| !n.read).count();
        Self {
            notifications,
            unread_count,
        }
    }

    pub fn newest(&self) -> Option<&Notification> {
        self.notifications.first()
    }
}
