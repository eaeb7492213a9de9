//! In-memory conversation history for one session.
//!
//! Messages keep their insertion position forever; every mutation is an
//! in-place update keyed by `MessageId`. Observers subscribe to a stream of
//! `StoreEvent`s to render progressive changes such as streamed text.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::api::{Attachment, Message, MessageId, MessageStatus};
use crate::error::StoreError;

pub type SharedStore = Arc<Mutex<MessageStore>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Appended(Message),
    Updated(Message),
    Cleared,
}

/// A pending message as seen by the poller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedJob {
    pub message_id: MessageId,
    pub job_status_url: String,
}

/// Terminal outcome of a pending job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Completed {
        content: String,
        attachments: Vec<Attachment>,
    },
    Failed {
        reason: String,
    },
}

#[derive(Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    subscribers: Vec<mpsc::UnboundedSender<StoreEvent>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn push(&mut self, message: Message) -> Result<(), StoreError> {
        if self.get(message.id).is_some() {
            return Err(StoreError::DuplicateId(message.id));
        }
        self.publish(StoreEvent::Appended(message.clone()));
        self.messages.push(message);
        Ok(())
    }

    /// Grows a message that is still being streamed. Pending and terminal
    /// messages are left alone.
    pub(crate) fn append_content(&mut self, id: MessageId, fragment: &str) -> bool {
        if !self.is_open(id) {
            return false;
        }
        self.update(id, |m| m.content.push_str(fragment))
    }

    /// Marks a streamed message `Completed`. Returns `false` for pending or
    /// already terminal messages.
    pub(crate) fn complete(&mut self, id: MessageId) -> bool {
        if !self.is_open(id) {
            return false;
        }
        self.update(id, |m| m.status = Some(MessageStatus::Completed))
    }

    /// Finalizes a pending message. Returns `false`, changing nothing, when
    /// the message is gone or already terminal.
    pub fn resolve(&mut self, id: MessageId, resolution: Resolution) -> bool {
        if !self.get(id).is_some_and(Message::is_pending) {
            return false;
        }
        self.update(id, |m| match resolution {
            Resolution::Completed {
                content,
                attachments,
            } => {
                m.content = content;
                m.attachments = attachments;
                m.status = Some(MessageStatus::Completed);
            }
            Resolution::Failed { reason } => {
                m.content = reason;
                m.status = Some(MessageStatus::Failed);
            }
        })
    }

    pub fn pending_jobs(&self) -> Vec<TrackedJob> {
        self.messages
            .iter()
            .filter_map(|m| {
                m.job_status_url().map(|url| TrackedJob {
                    message_id: m.id,
                    job_status_url: url.to_string(),
                })
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.publish(StoreEvent::Cleared);
    }

    // No status yet: neither waiting on a job nor terminal.
    fn is_open(&self, id: MessageId) -> bool {
        self.get(id).is_some_and(|m| m.status.is_none())
    }

    fn update(&mut self, id: MessageId, f: impl FnOnce(&mut Message)) -> bool {
        let Some(slot) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        f(slot);
        let snapshot = slot.clone();
        self.publish(StoreEvent::Updated(snapshot));
        true
    }

    fn publish(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Role;

    #[test]
    fn updates_keep_insertion_order() {
        let mut store = MessageStore::new();
        let first = Message::user("one", vec![]);
        let second = Message::assistant("two");
        let third = Message::user("three", vec![]);
        store.push(first.clone()).unwrap();
        store.push(second.clone()).unwrap();
        store.push(third.clone()).unwrap();

        assert!(store.append_content(second.id, "!"));
        assert!(store.complete(second.id));

        let contents: Vec<_> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two!", "three"]);
        assert_eq!(store.messages()[1].id, second.id);
        assert_eq!(store.messages()[1].status, Some(MessageStatus::Completed));
    }

    #[test]
    fn terminal_messages_cannot_be_reopened() {
        let mut store = MessageStore::new();
        let done = Message::completed("final", vec![]);
        let id = done.id;
        store.push(done).unwrap();

        assert!(!store.complete(id));
        assert!(!store.append_content(id, " more"));
        assert!(!store.resolve(id, Resolution::Failed { reason: "late".into() }));

        let msg = store.get(id).unwrap();
        assert_eq!(msg.content, "final");
        assert_eq!(msg.status, Some(MessageStatus::Completed));
        assert!(store.pending_jobs().is_empty());
    }

    #[test]
    fn pending_messages_wait_for_resolve() {
        let mut store = MessageStore::new();
        let pending = Message::pending("working", "https://jobs/1").unwrap();
        let id = pending.id;
        store.push(pending).unwrap();

        assert!(!store.complete(id));
        assert!(!store.append_content(id, "x"));
        assert_eq!(store.get(id).unwrap().content, "working");
        assert_eq!(store.pending_count(), 1);

        store.resolve(id, Resolution::Failed { reason: "no".into() });
        assert!(!store.complete(id));
        assert_eq!(store.get(id).unwrap().status, Some(MessageStatus::Failed));
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut store = MessageStore::new();
        let msg = Message::assistant("x");
        store.push(msg.clone()).unwrap();
        assert_eq!(store.push(msg.clone()), Err(StoreError::DuplicateId(msg.id)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn resolve_only_touches_pending_messages() {
        let mut store = MessageStore::new();
        let pending = Message::pending("wait", "https://jobs/1").unwrap();
        let id = pending.id;
        store.push(pending).unwrap();
        assert_eq!(store.pending_count(), 1);

        assert!(store.resolve(
            id,
            Resolution::Completed {
                content: "done".into(),
                attachments: vec![Attachment::new("v.mp4", "video/mp4", "https://cdn/v.mp4")],
            }
        ));
        let msg = store.get(id).unwrap();
        assert_eq!(msg.content, "done");
        assert_eq!(msg.status, Some(MessageStatus::Completed));
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(store.pending_count(), 0);

        // terminal: a late failure must not overwrite the result
        assert!(!store.resolve(id, Resolution::Failed { reason: "late".into() }));
        assert_eq!(store.get(id).unwrap().content, "done");
    }

    #[test]
    fn resolve_unknown_id_is_a_no_op() {
        let mut store = MessageStore::new();
        assert!(!store.resolve(MessageId::new(), Resolution::Failed { reason: "x".into() }));
    }

    #[test]
    fn pending_jobs_are_derived_from_current_state() {
        let mut store = MessageStore::new();
        let a = Message::pending("a", "https://jobs/a").unwrap();
        let b = Message::pending("b", "https://jobs/b").unwrap();
        store.push(Message::user("hi", vec![])).unwrap();
        store.push(a.clone()).unwrap();
        store.push(b.clone()).unwrap();

        store.resolve(a.id, Resolution::Failed { reason: "no".into() });
        assert_eq!(
            store.pending_jobs(),
            vec![TrackedJob {
                message_id: b.id,
                job_status_url: "https://jobs/b".into()
            }]
        );
    }

    #[test]
    fn subscribers_see_every_mutation() {
        let mut store = MessageStore::new();
        let mut events = store.subscribe();
        let msg = Message::assistant("");
        let id = msg.id;

        store.push(msg).unwrap();
        store.append_content(id, "Hel");
        store.append_content(id, "lo");
        store.clear();

        assert!(matches!(events.try_recv().unwrap(), StoreEvent::Appended(_)));
        match events.try_recv().unwrap() {
            StoreEvent::Updated(m) => assert_eq!(m.content, "Hel"),
            other => panic!("unexpected {other:?}"),
        }
        match events.try_recv().unwrap() {
            StoreEvent::Updated(m) => assert_eq!(m.content, "Hello"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Cleared);
        assert!(store.is_empty());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut store = MessageStore::new();
        drop(store.subscribe());
        store.push(Message::assistant("x")).unwrap();
        assert!(store.subscribers.is_empty());
    }
}
