// ── Notification inbox ──
//
// Ordered collection of alert records. Records arrive by server push
// (single or bulk-on-connect) and leave only after a successful
// acknowledge round-trip; a failed acknowledge leaves them visible.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use sensora_api::frame::Notification;

/// Snapshot of the inbox, in arrival order.
pub type InboxSnapshot = Arc<Vec<Notification>>;

pub(crate) struct NotificationInbox {
    items: Vec<Notification>,
    snapshot: watch::Sender<InboxSnapshot>,
}

impl NotificationInbox {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            items: Vec::new(),
            snapshot,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<InboxSnapshot> {
        self.snapshot.subscribe()
    }

    /// Append one pushed record.
    pub(crate) fn push(&mut self, notification: Notification) {
        self.items.push(notification);
        self.publish();
    }

    /// Append a bulk push in arrival order.
    pub(crate) fn extend(&mut self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        self.items.extend(notifications);
        self.publish();
    }

    /// Remove an acknowledged record. Called only after the acknowledge
    /// endpoint confirmed; returns `false` if the id was not present.
    pub(crate) fn acknowledge(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        let removed = self.items.len() != before;
        if removed {
            self.publish();
        } else {
            debug!(%id, "acknowledge for a notification not in the inbox");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.items.clone());
        self.snapshot.send_modify(|current| *current = snapshot);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sensora_api::frame::Severity;

    fn notification(title: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            level: Severity::Info,
            title: title.to_string(),
            description: String::new(),
            created_at: Utc::now(),
            read: false,
        }
    }

    #[test]
    fn pushes_preserve_arrival_order() {
        let mut inbox = NotificationInbox::new();
        inbox.push(notification("first"));
        inbox.extend(vec![notification("second"), notification("third")]);

        let snapshot = inbox.subscribe().borrow().clone();
        let titles: Vec<&str> = snapshot.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn acknowledge_removes_only_the_matching_record() {
        let mut inbox = NotificationInbox::new();
        let keep = notification("keep");
        let drop = notification("drop");
        inbox.extend(vec![keep.clone(), drop.clone()]);

        assert!(inbox.acknowledge(drop.id));
        assert_eq!(inbox.len(), 1);

        let snapshot = inbox.subscribe().borrow().clone();
        assert_eq!(snapshot[0].id, keep.id);
    }

    #[test]
    fn acknowledge_of_unknown_id_changes_nothing() {
        let mut inbox = NotificationInbox::new();
        inbox.push(notification("only"));

        let mut rx = inbox.subscribe();
        rx.borrow_and_update();
        assert!(!inbox.acknowledge(Uuid::new_v4()));
        assert_eq!(inbox.len(), 1);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn empty_bulk_push_does_not_publish() {
        let mut inbox = NotificationInbox::new();
        let mut rx = inbox.subscribe();
        inbox.extend(Vec::new());
        assert!(!rx.has_changed().unwrap());
    }
}
