use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::MessageId;
use crate::common::types::timestamp;
use crate::error::Result;
use crate::storage::{KeyValueStore, ReadStateStore};
use crate::ui::OpenLatch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: MessageId,
    #[serde(default)]
    pub title: String,
    pub message: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

/// Notification dropdown whose read marks live in the shared read-state set.
pub struct NotificationCenter<S> {
    items: Vec<Notification>,
    read_state: ReadStateStore<S>,
    dropdown: OpenLatch,
}

impl<S: KeyValueStore> NotificationCenter<S> {
    pub fn new(read_state: ReadStateStore<S>) -> Self {
        Self {
            items: Vec::new(),
            read_state,
            dropdown: OpenLatch::default(),
        }
    }

    /// Replace the list, newest first.
    pub fn replace(&mut self, mut items: Vec<Notification>) {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        self.items = items;
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.read_state.is_read(id)
    }

    pub fn unread_count(&self) -> usize {
        let read = self.read_state.read_ids();
        self.items.iter().filter(|item| !read.contains(&item.id)).count()
    }

    /// Opening marks everything listed as read, once per closed→open transition.
    pub fn open_dropdown(&mut self) -> Result<usize> {
        if !self.dropdown.open() {
            return Ok(0);
        }
        let ids = self.items.iter().map(|item| item.id.clone());
        self.read_state.mark_read(ids)
    }

    pub fn close_dropdown(&mut self) {
        self.dropdown.close();
    }

    pub fn is_open(&self) -> bool {
        self.dropdown.is_open()
    }

    /// Returns false when `id` is not listed.
    pub fn click(&mut self, id: &MessageId) -> Result<bool> {
        if !self.items.iter().any(|item| &item.id == id) {
            return Ok(false);
        }
        self.read_state.mark_read([id.clone()])?;
        Ok(true)
    }

    /// Remove the notification and forget its read mark, so a recreated
    /// notification with the same id shows as unread again.
    pub fn delete(&mut self, id: &MessageId) -> Result<Option<Notification>> {
        let Some(index) = self.items.iter().position(|item| &item.id == id) else {
            return Ok(None);
        };
        let removed = self.items.remove(index);
        self.read_state.mark_unread(id)?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn notification(id: i64, secs: i64) -> Notification {
        Notification {
            id: id.into(),
            title: "Order update".to_string(),
            message: format!("notification {id}"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn center() -> NotificationCenter<Arc<MemoryStore>> {
        let mut center = NotificationCenter::new(ReadStateStore::new(Arc::new(MemoryStore::new())));
        center.replace(vec![notification(1, 10), notification(2, 30), notification(3, 20)]);
        center
    }

    #[test]
    fn test_decodes_zone_less_timestamp() {
        let raw = r#"{
            "id": 12,
            "title": "Order shipped",
            "message": "Your battery is on the way",
            "createdAt": "2024-05-01T08:30:00"
        }"#;
        let notification: Notification = serde_json::from_str(raw).unwrap();
        assert_eq!(notification.id, MessageId::Num(12));
        assert_eq!(
            notification.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
        );

        let zoned = raw.replace("08:30:00", "10:30:00+02:00");
        let notification: Notification = serde_json::from_str(&zoned).unwrap();
        assert_eq!(
            notification.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_items_are_newest_first() {
        let center = center();
        let ids: Vec<_> = center.items().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, [2, 3, 1].map(MessageId::from).to_vec());
    }

    #[test]
    fn test_open_marks_all_once_per_transition() {
        let mut center = center();
        assert_eq!(center.unread_count(), 3);

        assert_eq!(center.open_dropdown().unwrap(), 3);
        assert_eq!(center.unread_count(), 0);

        // arrives while open: stays unread until the next opening
        let mut items = center.items().to_vec();
        items.push(notification(4, 40));
        center.replace(items);
        assert_eq!(center.open_dropdown().unwrap(), 0);
        assert_eq!(center.unread_count(), 1);

        center.close_dropdown();
        assert_eq!(center.open_dropdown().unwrap(), 1);
        assert_eq!(center.unread_count(), 0);
    }

    #[test]
    fn test_click_marks_single_item() {
        let mut center = center();
        assert!(center.click(&MessageId::from(3)).unwrap());
        assert!(!center.click(&MessageId::from(99)).unwrap());
        assert!(center.is_read(&MessageId::from(3)));
        assert_eq!(center.unread_count(), 2);
    }

    #[test]
    fn test_deleted_notification_returns_unread() {
        let mut center = center();
        center.open_dropdown().unwrap();

        let removed = center.delete(&MessageId::from(2)).unwrap();
        assert_eq!(removed.map(|n| n.id), Some(MessageId::from(2)));
        assert!(!center.is_read(&MessageId::from(2)));

        center.replace(vec![notification(2, 50)]);
        assert_eq!(center.unread_count(), 1);
        assert_eq!(center.delete(&MessageId::from(42)).unwrap(), None);
    }
}
