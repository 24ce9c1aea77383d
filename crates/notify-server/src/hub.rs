//! Process-wide relay state.
//!
//! All session bookkeeping goes through [`NotificationHub`]. Lock order is
//! always session topics, then the subscription index, so a session's topic
//! set and the index never disagree once a call returns.

use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::dispatcher::{EventDispatcher, FanOutReport};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::protocol::{ClientMessage, Event};
use crate::registry::ConnectionRegistry;
use crate::subscription::SubscriptionIndex;
use crate::websocket::session::{Payload, Session};

/// Owns the registry, the subscription index and the dispatcher.
pub struct NotificationHub {
    config: SessionConfig,
    registry: ConnectionRegistry,
    index: Arc<SubscriptionIndex>,
    dispatcher: EventDispatcher,
}

impl NotificationHub {
    /// Empty hub.
    pub fn new(config: SessionConfig) -> Self {
        let index = Arc::new(SubscriptionIndex::new());
        Self {
            config,
            registry: ConnectionRegistry::new(),
            dispatcher: EventDispatcher::new(Arc::clone(&index)),
            index,
        }
    }

    /// Per-connection settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Live connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Topic subscriptions.
    pub fn index(&self) -> &SubscriptionIndex {
        &self.index
    }

    /// Register a new connection.
    pub fn open_session(&self) -> (Arc<Session>, mpsc::Receiver<Payload>) {
        let (session, rx) = self.registry.register(self.config.queue_capacity);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(session_id = session.id(), "session opened");
        (session, rx)
    }

    /// Follow `topic`. Idempotent. Refused once the session is closing.
    pub fn subscribe(&self, session: &Arc<Session>, topic: &str) -> bool {
        let mut topics = session.topics_lock();
        if !session.is_active() {
            return false;
        }
        if topics.insert(topic.to_owned()) {
            let _ = self.index.insert(topic, session);
            debug!(session_id = session.id(), topic, "subscribed");
        }
        true
    }

    /// Stop following `topic`. Returns whether the session was following it.
    pub fn unsubscribe(&self, session: &Session, topic: &str) -> bool {
        let mut topics = session.topics_lock();
        if !topics.remove(topic) {
            return false;
        }
        let _ = self.index.remove(topic, session.id());
        debug!(session_id = session.id(), topic, "unsubscribed");
        true
    }

    /// Apply a decoded client command, in list order.
    pub fn apply(&self, session: &Arc<Session>, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe { repos } => {
                for repo in repos {
                    let _ = self.subscribe(session, &repo.id);
                }
            }
            ClientMessage::Unsubscribe { repos } => {
                for repo in repos {
                    let _ = self.unsubscribe(session, &repo);
                }
            }
        }
    }

    /// Tear a session down. Safe to call from every loop; only the first
    /// call does anything, and it returns `true`.
    pub fn teardown(&self, session: &Session) -> bool {
        if !session.begin_close() {
            return false;
        }
        let _ = self.registry.unregister(session.id());
        let topics: Vec<String> = session.topics_lock().drain().collect();
        for topic in &topics {
            let _ = self.index.remove(topic, session.id());
        }
        session.finish_close();

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        info!(
            session_id = session.id(),
            topics = topics.len(),
            age_ms = u64::try_from(session.age().as_millis()).unwrap_or(u64::MAX),
            "session closed"
        );
        true
    }

    /// Fan an event out to its topic's subscribers. Never waits.
    pub fn dispatch(&self, event: &Event) -> Option<JoinHandle<FanOutReport>> {
        self.dispatcher.dispatch(event)
    }

    /// Tear down every live session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        self.registry
            .sessions()
            .iter()
            .filter(|session| self.teardown(session))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EventKind, RepoSubscription};
    use crate::websocket::session::SessionState;
    use serde_json::{Value, json};

    fn hub() -> NotificationHub {
        NotificationHub::new(SessionConfig::default())
    }

    fn event(repo: &str) -> Event {
        let Value::Object(content) = json!({"repo_id": repo, "commit_id": "c"}) else {
            unreachable!()
        };
        Event::new(EventKind::RepoUpdate, content).unwrap()
    }

    fn subscribe_msg(ids: &[&str]) -> ClientMessage {
        ClientMessage::Subscribe {
            repos: ids
                .iter()
                .map(|id| RepoSubscription {
                    id: (*id).to_owned(),
                    jwt_token: String::new(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn open_session_registers() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        assert_eq!(session.id(), 1);
        assert!(hub.registry().get(1).is_some());
    }

    #[tokio::test]
    async fn subscribe_updates_both_sides() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        assert!(hub.subscribe(&session, "r1"));
        assert!(hub.subscribe(&session, "r1"));
        assert_eq!(session.topics(), ["r1"]);
        assert_eq!(hub.index().subscriber_count("r1"), 1);
    }

    #[tokio::test]
    async fn unsubscribe_updates_both_sides() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        let _ = hub.subscribe(&session, "r1");
        assert!(hub.unsubscribe(&session, "r1"));
        assert!(!hub.unsubscribe(&session, "r1"));
        assert!(!session.is_subscribed("r1"));
        assert_eq!(hub.index().topic_count(), 0);
    }

    #[tokio::test]
    async fn apply_handles_lists_in_order() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        hub.apply(&session, subscribe_msg(&["r1", "r2", "r3"]));
        hub.apply(
            &session,
            ClientMessage::Unsubscribe {
                repos: vec!["r2".into(), "missing".into()],
            },
        );
        assert_eq!(session.topics(), ["r1", "r3"]);
        hub.apply(&session, subscribe_msg(&[]));
        assert_eq!(session.topics().len(), 2);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_complete() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        hub.apply(&session, subscribe_msg(&["r1", "r2"]));

        assert!(hub.teardown(&session));
        assert!(!hub.teardown(&session));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(hub.registry().is_empty());
        assert_eq!(hub.index().topic_count(), 0);
        assert!(session.topics().is_empty());
    }

    #[tokio::test]
    async fn subscribe_refused_after_teardown() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        let _ = hub.teardown(&session);
        assert!(!hub.subscribe(&session, "r1"));
        assert_eq!(hub.index().topic_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_reaches_subscriber() {
        let hub = hub();
        let (session, mut rx) = hub.open_session();
        let _ = hub.subscribe(&session, "r1");
        let report = hub.dispatch(&event("r1")).unwrap().await.unwrap();
        assert_eq!(report.delivered(), 1);
        let payload: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(payload["type"], "repo-update");
        assert!(hub.dispatch(&event("r2")).is_none());
    }

    #[tokio::test]
    async fn no_delivery_after_teardown() {
        let hub = hub();
        let (session, _rx) = hub.open_session();
        let _ = hub.subscribe(&session, "r1");
        let _ = hub.teardown(&session);
        assert!(hub.dispatch(&event("r1")).is_none());
    }

    #[tokio::test]
    async fn close_all_tears_everything_down() {
        let hub = hub();
        let (a, _ra) = hub.open_session();
        let (b, _rb) = hub.open_session();
        let _ = hub.subscribe(&a, "r1");
        let _ = hub.subscribe(&b, "r2");
        let _ = hub.teardown(&b);

        assert_eq!(hub.close_all(), 1);
        assert!(hub.registry().is_empty());
        assert_eq!(hub.index().topic_count(), 0);
        assert_eq!(a.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_teardown_leave_no_orphans() {
        let hub = Arc::new(hub());
        for _ in 0..50 {
            let (session, _rx) = hub.open_session();
            let subscriber = {
                let hub = Arc::clone(&hub);
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    for i in 0..10 {
                        let _ = hub.subscribe(&session, &format!("r{i}"));
                        tokio::task::yield_now().await;
                    }
                })
            };
            tokio::task::yield_now().await;
            let _ = hub.teardown(&session);
            subscriber.await.unwrap();
            assert!(session.topics().is_empty());
        }
        assert_eq!(hub.index().topic_count(), 0);
    }
}
