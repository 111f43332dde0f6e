//! Conversation state store and awaiting-response transitions
//!
//! The store is plain data; `SharedState` is the single lock every routing
//! pass goes through. Closures passed to [`SharedState::read`] and
//! [`SharedState::update`] run synchronously, so no guard ever lives across
//! an await point.

pub mod state;
pub mod transition;

#[cfg(test)]
mod proptests;

pub use state::{ConversationStore, RANDOM_TOPIC};
pub use transition::{awaiting_transition, AwaitingChange};

use std::sync::{Mutex, PoisonError};

/// Process-wide routing state guarded by one mutex
#[derive(Debug, Default)]
pub struct SharedState {
    store: Mutex<ConversationStore>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ConversationStore) -> R) -> R {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ConversationStore) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    pub fn topic(&self, thread_id: &str) -> String {
        self.read(|s| s.topic(thread_id))
    }

    pub fn is_awaiting(&self, thread_id: &str) -> bool {
        self.read(|s| s.is_awaiting(thread_id))
    }

    pub fn set_awaiting(&self, thread_id: &str, awaiting: bool) -> bool {
        self.update(|s| s.set_awaiting(thread_id, awaiting))
    }

    pub fn list_awaiting(&self) -> Vec<String> {
        self.read(ConversationStore::list_awaiting)
    }

    pub fn mirror_target(&self) -> Option<String> {
        self.read(|s| s.mirror_target().map(String::from))
    }

    /// Apply an automatic transition. Returns `true` if membership changed.
    pub fn apply(&self, thread_id: &str, change: AwaitingChange) -> bool {
        match change.membership() {
            Some(awaiting) => self.set_awaiting(thread_id, awaiting),
            None => false,
        }
    }
}
