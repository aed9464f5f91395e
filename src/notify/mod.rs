use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::broadcast::{BroadcastSink, Room};
use crate::error::AppError;
use crate::models::notification::{NewNotification, Notification};
use crate::models::user::Role;
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Creates notification records and fans them out to connected clients.
/// Persistence is the only guarantee; the live push is best-effort with no
/// retry or delivery receipt beyond `read_by`.
pub struct Notifier {
    store: Arc<Store>,
    sink: Arc<dyn BroadcastSink>,
    metrics: Metrics,
}

impl Notifier {
    pub fn new(store: Arc<Store>, sink: Arc<dyn BroadcastSink>, metrics: Metrics) -> Self {
        Self {
            store,
            sink,
            metrics,
        }
    }

    pub fn emit(&self, new: NewNotification) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            notification_type: new.notification_type,
            user_id: new.user_id,
            receiver_role: new.receiver_role,
            send_to_all: new.send_to_all,
            is_read: false,
            read_by: Vec::new(),
            target_id: new.target_id,
            created_at: Utc::now(),
        };

        self.store.insert_notification(notification.clone());
        self.metrics
            .notifications_emitted_total
            .with_label_values(&[notification.notification_type.as_str()])
            .inc();

        if let Some(room) = self.room_for(&notification) {
            let payload = serde_json::to_value(&notification).unwrap_or_default();
            self.sink.publish(room, "new_notification", payload);
        }

        debug!(
            notification_id = %notification.id,
            kind = ?notification.notification_type,
            "notification emitted"
        );

        notification
    }

    /// Room resolution: explicit receiver role wins, then the direct target
    /// user's own role, then everyone for send-to-all. A direct target whose
    /// user record is gone gets no live push, only the persisted record.
    fn room_for(&self, notification: &Notification) -> Option<Room> {
        if let Some(role) = notification.receiver_role {
            return Some(Room::for_role(role));
        }
        if let Some(user_id) = notification.user_id {
            return self
                .store
                .find_user(user_id)
                .map(|user| Room::for_role(user.role));
        }
        if notification.send_to_all {
            return Some(Room::All);
        }
        None
    }

    pub fn list_unread(&self, user_id: Uuid, role: Role) -> Vec<Notification> {
        self.store.list_unread_notifications(user_id, role)
    }

    /// Idempotent: re-reading an already-read notification is not an error.
    pub fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        self.store
            .update_notification(notification_id, |notification| {
                if !notification.read_by.contains(&user_id) {
                    notification.read_by.push(user_id);
                }
                notification.is_read = true;
                Ok(())
            })
    }

    /// Scan-then-mark; notifications created during the scan are picked up
    /// by the next call. The race is accepted.
    pub fn mark_all_read(&self, user_id: Uuid, role: Role) -> Result<usize, AppError> {
        let unread = self.store.list_unread_notifications(user_id, role);
        let count = unread.len();
        for notification in unread {
            self.mark_read(notification.id, user_id)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use uuid::Uuid;

    use super::Notifier;
    use crate::broadcast::{BroadcastSink, Room};
    use crate::models::notification::{NewNotification, NotificationType};
    use crate::models::user::Role;
    use crate::store::Store;

    struct NullSink;

    impl BroadcastSink for NullSink {
        fn publish(&self, _room: Room, _event: &str, _payload: Value) {}
    }

    fn notifier() -> Notifier {
        Notifier::new(
            Arc::new(Store::new()),
            Arc::new(NullSink),
            crate::observability::metrics::Metrics::new(),
        )
    }

    fn role_broadcast(role: Role) -> NewNotification {
        NewNotification {
            title: "t".to_string(),
            description: "d".to_string(),
            notification_type: NotificationType::Custom,
            user_id: None,
            receiver_role: Some(role),
            send_to_all: false,
            target_id: None,
        }
    }

    #[test]
    fn unread_matches_direct_target_and_role_broadcast() {
        let notifier = notifier();
        let admin = Uuid::new_v4();

        notifier.emit(role_broadcast(Role::Admin));
        notifier.emit(NewNotification {
            user_id: Some(admin),
            receiver_role: None,
            ..role_broadcast(Role::Admin)
        });
        notifier.emit(role_broadcast(Role::Customer));

        let unread = notifier.list_unread(admin, Role::Admin);
        assert_eq!(unread.len(), 2);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let notifier = notifier();
        let user = Uuid::new_v4();
        let created = notifier.emit(role_broadcast(Role::Customer));

        notifier.mark_read(created.id, user).unwrap();
        notifier.mark_read(created.id, user).unwrap();

        let unread = notifier.list_unread(user, Role::Customer);
        assert!(unread.is_empty());

        let stored = notifier
            .store
            .list_notifications()
            .into_iter()
            .find(|n| n.id == created.id)
            .unwrap();
        let occurrences = stored.read_by.iter().filter(|id| **id == user).count();
        assert_eq!(occurrences, 1);
        assert!(stored.is_read);
    }

    #[test]
    fn mark_all_read_clears_the_unread_list() {
        let notifier = notifier();
        let user = Uuid::new_v4();

        notifier.emit(role_broadcast(Role::Customer));
        notifier.emit(role_broadcast(Role::Customer));

        let marked = notifier.mark_all_read(user, Role::Customer).unwrap();
        assert_eq!(marked, 2);
        assert!(notifier.list_unread(user, Role::Customer).is_empty());
    }
}
