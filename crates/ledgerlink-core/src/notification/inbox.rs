// ── Notification inbox ──
//
// Local history of received notifications, newest first. The channel does
// not replay history, so this is the only record; entries leave only via
// `clear`.

use tokio::sync::watch;
use uuid::Uuid;

use super::channel::NotificationChannel;
use super::event::NotificationEvent;
use crate::observer::Subscription;

/// Observable list of notifications. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NotificationInbox {
    events: watch::Sender<Vec<NotificationEvent>>,
}

impl Default for NotificationInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationInbox {
    pub fn new() -> Self {
        let (events, _) = watch::channel(Vec::new());
        Self { events }
    }

    /// Feed every event the channel delivers into this inbox.
    pub fn attach(&self, channel: &NotificationChannel) -> Subscription {
        let inbox = self.clone();
        channel.add_listener(move |event| inbox.push(event.clone()))
    }

    /// Record an event. Events without an id get a local one; an id that is
    /// already present is ignored.
    pub fn push(&self, mut event: NotificationEvent) {
        let id = event
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        self.events.send_if_modified(|events| {
            if events.iter().any(|e| e.id.as_deref() == Some(id.as_str())) {
                return false;
            }
            events.insert(0, event);
            true
        });
    }

    /// Mark one event seen. Returns `false` if no event has that id.
    pub fn mark_seen(&self, id: &str) -> bool {
        self.update_one(id, |event| event.seen = true)
    }

    pub fn mark_all_seen(&self) {
        self.events.send_if_modified(|events| {
            let mut changed = false;
            for event in events.iter_mut().filter(|e| !e.seen) {
                event.seen = true;
                changed = true;
            }
            changed
        });
    }

    /// Record that a toast was displayed for this event.
    pub fn mark_toast_shown(&self, id: &str) -> bool {
        self.update_one(id, |event| event.toast_shown = true)
    }

    /// Events that have not been toasted yet, oldest first.
    pub fn pending_toasts(&self) -> Vec<NotificationEvent> {
        self.events
            .borrow()
            .iter()
            .rev()
            .filter(|e| !e.toast_shown)
            .cloned()
            .collect()
    }

    pub fn unseen_count(&self) -> usize {
        self.events.borrow().iter().filter(|e| !e.seen).count()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.send_if_modified(|events| {
            let had_any = !events.is_empty();
            events.clear();
            had_any
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<NotificationEvent>> {
        self.events.subscribe()
    }

    fn update_one(&self, id: &str, f: impl FnOnce(&mut NotificationEvent)) -> bool {
        self.events.send_if_modified(|events| {
            match events.iter_mut().find(|e| e.id.as_deref() == Some(id)) {
                Some(event) => {
                    f(event);
                    true
                }
                None => false,
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(id: Option<&str>, message: &str) -> NotificationEvent {
        let mut e = NotificationEvent::local("INFO", message);
        e.id = id.map(str::to_owned);
        e
    }

    #[test]
    fn newest_first_and_ids_assigned() {
        let inbox = NotificationInbox::new();
        inbox.push(event(Some("1"), "first"));
        inbox.push(event(None, "second"));

        let events = inbox.events();
        assert_eq!(events[0].message, "second");
        assert!(events[0].id.is_some());
        assert_eq!(events[1].id.as_deref(), Some("1"));
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let inbox = NotificationInbox::new();
        inbox.push(event(Some("7"), "a"));
        inbox.push(event(Some("7"), "a again"));
        assert_eq!(inbox.len(), 1);
    }

    #[test]
    fn seen_and_toast_tracking() {
        let inbox = NotificationInbox::new();
        inbox.push(event(Some("1"), "one"));
        inbox.push(event(Some("2"), "two"));
        assert_eq!(inbox.unseen_count(), 2);

        assert!(inbox.mark_seen("1"));
        assert!(!inbox.mark_seen("missing"));
        assert_eq!(inbox.unseen_count(), 1);

        assert!(inbox.mark_toast_shown("1"));
        let pending: Vec<_> = inbox.pending_toasts().into_iter().map(|e| e.message).collect();
        assert_eq!(pending, ["two"]);

        inbox.mark_all_seen();
        assert_eq!(inbox.unseen_count(), 0);

        inbox.clear();
        assert!(inbox.is_empty());
    }

    #[test]
    fn watchers_are_notified() {
        let inbox = NotificationInbox::new();
        let mut rx = inbox.subscribe();
        inbox.push(event(Some("1"), "one"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
