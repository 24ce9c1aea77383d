//! Event fan-out.
//!
//! Delivery runs in two phases. First every subscriber is offered the
//! payload without waiting, in dispatch order on the caller's task. Any
//! subscriber whose queue was full gets a deferred send, and a background
//! task waits on all of them together. A stuck subscriber therefore holds
//! up neither the producer nor the other subscribers, and a session's
//! payloads still reach its queue in dispatch order.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::errors::EnqueueError;
use crate::metrics::{
    EVENT_DEFERRED_DELIVERIES_TOTAL, EVENT_DELIVERIES_TOTAL, EVENT_DROPPED_DELIVERIES_TOTAL,
};
use crate::protocol::{Event, encode_event};
use crate::subscription::SubscriptionIndex;
use crate::websocket::session::{Payload, Session};

/// Outcome of delivering one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Subscribers in the snapshot.
    pub subscribers: usize,
    /// Queued without waiting.
    pub immediate: usize,
    /// Queue was full; handed to the background phase.
    pub deferred: usize,
    /// Never queued because the session closed.
    pub dropped: usize,
}

impl FanOutReport {
    /// Subscribers that received the payload.
    pub fn delivered(&self) -> usize {
        self.subscribers - self.dropped
    }
}

/// Resolves an event to its subscribers and fans it out.
pub struct EventDispatcher {
    index: Arc<SubscriptionIndex>,
}

impl EventDispatcher {
    /// Dispatcher reading subscribers from `index`.
    pub fn new(index: Arc<SubscriptionIndex>) -> Self {
        Self { index }
    }

    /// Deliver `event` to every session following its topic.
    ///
    /// Never waits. Returns `None` when nobody follows the topic, otherwise a
    /// handle to the background phase that yields the final report.
    #[instrument(skip_all, fields(kind = %event.kind(), topic = event.topic()))]
    pub fn dispatch(&self, event: &Event) -> Option<JoinHandle<FanOutReport>> {
        let subscribers = self.index.subscribers_of(event.topic());
        if subscribers.is_empty() {
            debug!("no subscribers");
            return None;
        }
        let payload = match encode_event(event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to encode event");
                return None;
            }
        };
        Some(fan_out(&subscribers, &payload))
    }
}

/// Offer `payload` to each session, deferring the ones whose queue is full.
pub fn fan_out(subscribers: &[Arc<Session>], payload: &Payload) -> JoinHandle<FanOutReport> {
    let mut report = FanOutReport {
        subscribers: subscribers.len(),
        ..FanOutReport::default()
    };
    let mut pending = Vec::new();
    for session in subscribers {
        match session.try_enqueue(Arc::clone(payload)) {
            Ok(()) => report.immediate += 1,
            Err(EnqueueError::Full) => {
                pending.push((session.id(), session.enqueue_deferred(Arc::clone(payload))));
            }
            Err(EnqueueError::Closed) => report.dropped += 1,
        }
    }
    report.deferred = pending.len();
    counter!(EVENT_DEFERRED_DELIVERIES_TOTAL).increment(report.deferred as u64);

    tokio::spawn(async move {
        let results = join_all(
            pending
                .into_iter()
                .map(|(id, send)| async move { (id, send.await) }),
        )
        .await;
        for (session_id, result) in results {
            if let Err(e) = result {
                report.dropped += 1;
                debug!(session_id, error = %e, "deferred delivery dropped");
            }
        }
        counter!(EVENT_DELIVERIES_TOTAL).increment(report.delivered() as u64);
        counter!(EVENT_DROPPED_DELIVERIES_TOTAL).increment(report.dropped as u64);
        debug!(
            subscribers = report.subscribers,
            immediate = report.immediate,
            deferred = report.deferred,
            dropped = report.dropped,
            "fan-out complete"
        );
        report
    })
}
