//! Topic → subscriber index.
//!
//! Two-level locking: the outer map is only write-locked to add or drop a
//! topic, so inserts and removals on different topics do not contend. An
//! empty topic is dropped once its last subscriber leaves.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::websocket::session::{Session, SessionId};

type SubscriberSet = Arc<RwLock<HashMap<SessionId, Arc<Session>>>>;

/// Maps each repository topic to the sessions following it.
#[derive(Default)]
pub struct SubscriptionIndex {
    topics: RwLock<HashMap<String, SubscriberSet>>,
}

impl SubscriptionIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session` to `topic`. Returns `false` if it was already there.
    pub fn insert(&self, topic: &str, session: &Arc<Session>) -> bool {
        {
            let topics = self.topics.read();
            if let Some(set) = topics.get(topic) {
                return set.write().insert(session.id(), Arc::clone(session)).is_none();
            }
        }
        let mut topics = self.topics.write();
        let set = topics.entry(topic.to_owned()).or_default();
        set.write().insert(session.id(), Arc::clone(session)).is_none()
    }

    /// Remove session `id` from `topic`. Returns whether it was present.
    pub fn remove(&self, topic: &str, id: SessionId) -> bool {
        let (removed, now_empty) = {
            let topics = self.topics.read();
            let Some(set) = topics.get(topic) else {
                return false;
            };
            let mut set = set.write();
            let removed = set.remove(&id).is_some();
            (removed, set.is_empty())
        };
        if now_empty {
            let mut topics = self.topics.write();
            // Re-check: a subscriber may have joined between the two locks.
            if topics.get(topic).is_some_and(|set| set.read().is_empty()) {
                let _ = topics.remove(topic);
            }
        }
        removed
    }

    /// Point-in-time snapshot of the sessions following `topic`, by id.
    pub fn subscribers_of(&self, topic: &str) -> Vec<Arc<Session>> {
        let set = self.topics.read().get(topic).cloned();
        let mut sessions: Vec<Arc<Session>> = set
            .map(|set| set.read().values().cloned().collect())
            .unwrap_or_default();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    /// Whether session `id` follows `topic`.
    pub fn contains(&self, topic: &str, id: SessionId) -> bool {
        self.topics
            .read()
            .get(topic)
            .is_some_and(|set| set.read().contains_key(&id))
    }

    /// Number of sessions following `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, |set| set.read().len())
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }
}
