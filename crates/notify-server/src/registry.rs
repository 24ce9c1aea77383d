//! Registry of live connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::websocket::session::{Payload, Session, SessionId};

/// Assigns session ids and tracks every live session.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl ConnectionRegistry {
    /// Empty registry; the first id handed out is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session with a fresh id and register it.
    pub fn register(&self, queue_capacity: usize) -> (Arc<Session>, mpsc::Receiver<Payload>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, rx) = Session::new(id, queue_capacity);
        let _ = self.sessions.write().insert(id, Arc::clone(&session));
        (session, rx)
    }

    /// Remove a session. Removing an unknown id is a no-op.
    pub fn unregister(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(&id)
    }

    /// Look up a live session.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Snapshot of all live sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
