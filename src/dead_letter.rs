//! Dead-letter store: the terminal archive for undeliverable messages.
//!
//! Entries are appended when a message exhausts its retry budget (or a
//! handler reports a fatal error) and are never mutated afterwards. The
//! store is inspected, not replayed; replay is a caller concern.

use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::message::Message;

/// One permanently failed message plus the reason it was archived.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    /// The message in its final state (`MessageStatus::DeadLetter`).
    pub message: Message,
    /// The last delivery failure reason.
    pub reason: Arc<str>,
    /// When the message was archived.
    pub at: SystemTime,
}

/// Append-only collection of dead letters, safe for concurrent writers.
#[derive(Debug, Default)]
pub struct DeadLetterStore {
    entries: RwLock<Vec<DeadLetter>>,
}

impl DeadLetterStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Called by topic actors on dead-letter transitions.
    pub(crate) fn push(&self, message: Message, reason: Arc<str>) {
        let entry = DeadLetter {
            message,
            reason,
            at: SystemTime::now(),
        };
        self.entries
            .write()
            .expect("dead letter lock poisoned")
            .push(entry);
    }

    /// Returns the number of archived messages.
    pub fn len(&self) -> usize {
        self.entries.read().expect("dead letter lock poisoned").len()
    }

    /// Returns `true` if nothing has been archived.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of all entries, in archive order.
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries
            .read()
            .expect("dead letter lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageId;
    use bytes::Bytes;

    #[test]
    fn push_and_snapshot() {
        let store = DeadLetterStore::new();
        assert!(store.is_empty());

        let m = Message::new(MessageId(9), Arc::from("orders"), Bytes::from_static(b"p"));
        store.push(m, Arc::from("boom"));

        assert_eq!(store.len(), 1);
        let snap = store.snapshot();
        assert_eq!(snap[0].message.id(), MessageId(9));
        assert_eq!(&*snap[0].reason, "boom");
    }
}
