//! Push subscriptions of one connection session.

use std::collections::HashSet;

use blegate_domain::item::CharacteristicItem;
use uuid::Uuid;

use crate::envelope::CollectedData;
use crate::ports::Notification;

/// Characteristics subscribed for push delivery in the current session.
///
/// Grows monotonically while the session lives and is dropped with it, so
/// a UUID is subscribed at most once per session.
#[derive(Debug, Default)]
pub struct NotificationRegistry {
    subscribed: HashSet<Uuid>,
}

impl NotificationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_registered(&self, uuid: &Uuid) -> bool {
        self.subscribed.contains(uuid)
    }

    /// Record a subscription. Returns `false` if `uuid` was already
    /// registered, in which case nothing changes.
    pub fn register(&mut self, uuid: Uuid) -> bool {
        self.subscribed.insert(uuid)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribed.is_empty()
    }

    /// Collect the configured items fed by `notification`.
    ///
    /// Items are matched on their resolved handle. Items sharing a handle
    /// are grouped together. Returns `None` when no item matches.
    #[must_use]
    pub fn route(
        items: &[CharacteristicItem],
        notification: &Notification,
    ) -> Option<CollectedData> {
        let mut data = CollectedData::default();
        for item in items
            .iter()
            .filter(|item| item.handle == Some(notification.handle))
        {
            data.push(item, notification.value.clone());
        }
        (!data.is_empty()).then_some(data)
    }
}
