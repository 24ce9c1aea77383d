//! Per-connection state shared by a connection's loops, the hub and the
//! dispatcher.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::EnqueueError;

/// Process-unique connection id. Assigned from 1 upward and never reused.
pub type SessionId = u64;

/// Serialized event envelope, shared by every recipient of one event.
pub type Payload = Arc<String>;

/// A send parked until the session's queue has room or the session closes.
pub type DeferredSend = Pin<Box<dyn Future<Output = Result<(), EnqueueError>> + Send>>;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting subscriptions and events.
    Active,
    /// Teardown has begun; new work is refused.
    Closing,
    /// Teardown finished.
    Closed,
}

const ACTIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// One connected client.
pub struct Session {
    id: SessionId,
    tx: mpsc::Sender<Payload>,
    topics: Mutex<HashSet<String>>,
    last_pong: Mutex<Instant>,
    state: AtomicU8,
    closed: CancellationToken,
    connected_at: Instant,
}

impl Session {
    /// Create a session and the receiving half of its outbound queue.
    pub fn new(id: SessionId, queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let now = Instant::now();
        let session = Arc::new(Self {
            id,
            tx,
            topics: Mutex::new(HashSet::new()),
            last_pong: Mutex::new(now),
            state: AtomicU8::new(ACTIVE),
            closed: CancellationToken::new(),
            connected_at: now,
        });
        (session, rx)
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            ACTIVE => SessionState::Active,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// Whether the session still accepts work.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Topics currently followed, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether the session follows `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.lock().contains(topic)
    }

    /// Queue a payload without waiting.
    pub fn try_enqueue(&self, payload: Payload) -> Result<(), EnqueueError> {
        if !self.is_active() {
            return Err(EnqueueError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Queue a payload, waiting for room.
    ///
    /// The send joins the queue's wait line before this returns, so payloads
    /// deferred for the same session are delivered in call order. The
    /// returned future resolves once the payload is queued, or with
    /// [`EnqueueError::Closed`] if the session closes first.
    pub fn enqueue_deferred(&self, payload: Payload) -> DeferredSend {
        let tx = self.tx.clone();
        let closed = self.closed.clone();
        let mut send: DeferredSend = Box::pin(tokio::task::unconstrained(async move {
            tokio::select! {
                biased;
                () = closed.cancelled() => Err(EnqueueError::Closed),
                sent = tx.send(payload) => sent.map_err(|_| EnqueueError::Closed),
            }
        }));
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match send.as_mut().poll(&mut cx) {
            Poll::Ready(result) => Box::pin(std::future::ready(result)),
            Poll::Pending => send,
        }
    }

    /// Record a keepalive response from the client.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last keepalive response (or since connect).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Resolves once teardown has finished.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Guard over the topic set. Held while the subscription index is
    /// updated so the two never disagree.
    pub(crate) fn topics_lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.topics.lock()
    }

    /// `Active → Closing`. Only the first caller wins.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// `Closing → Closed`, waking everything parked on [`Session::closed`].
    pub(crate) fn finish_close(&self) {
        self.state.store(CLOSED, Ordering::SeqCst);
        self.closed.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
