//! Correlates engine output with the queries waiting for it.
//!
//! Each submitted query registers a subscription under its id. Messages for
//! that id are forwarded as [`AnalysisEvent`]s until the stream is over:
//! - a progressive update (`isDuringSearch`) is forwarded and the stream stays open
//! - a final response closes the stream once every analysed turn has had one
//! - an error closes the stream; a warning does not
//!
//! Messages for ids nobody is waiting for are logged and dropped. Dropping a
//! [`Subscription`] cancels interest; the engine is not told and the
//! remaining messages for that id are discarded.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::response::{AnalysisMessage, ErrorResponse, ProtocolError, Response};

#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisEvent {
    /// Partial result; replaces any earlier one for the same turn.
    Update(Response),
    Final(Response),
    Warning(ErrorResponse),
    Error(ErrorResponse),
}

struct Entry {
    tx: Sender<AnalysisEvent>,
    remaining_finals: usize,
}

#[derive(Default)]
pub struct AnalysisRouter {
    subscribers: Mutex<HashMap<String, Entry>>,
}

impl AnalysisRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start listening for `id`, expecting `expected_finals` final responses.
    pub fn register(&self, id: impl Into<String>, expected_finals: usize) -> Subscription {
        let id = id.into();
        let (tx, rx) = mpsc::channel();
        let entry = Entry {
            tx,
            remaining_finals: expected_finals.max(1),
        };
        if self.subscribers().insert(id.clone(), entry).is_some() {
            warn!(%id, "query id reused, previous subscriber dropped");
        }
        Subscription { id, rx }
    }

    /// Stop listening for `id`.
    pub fn cancel(&self, id: &str) -> bool {
        self.subscribers().remove(id).is_some()
    }

    pub fn pending(&self) -> usize {
        self.subscribers().len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.subscribers().contains_key(id)
    }

    /// Drop every subscription, e.g. when the engine exits. Waiting
    /// subscribers see the stream close.
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers();
        if !subscribers.is_empty() {
            debug!(count = subscribers.len(), "closing pending analysis queries");
        }
        subscribers.clear();
    }

    /// Forward one engine message. Returns whether a subscriber received it.
    pub fn dispatch(&self, message: AnalysisMessage) -> bool {
        let mut subscribers = self.subscribers();
        let id = message.id().to_string();
        let Some(entry) = subscribers.get_mut(&id) else {
            match &message {
                AnalysisMessage::Error(e) => warn!(%id, error = %e.message(), "engine error for unknown query"),
                AnalysisMessage::Response(_) => debug!(%id, "response for unknown query dropped"),
            }
            return false;
        };

        let (event, closes) = match message {
            AnalysisMessage::Response(r) if r.is_during_search => (AnalysisEvent::Update(r), false),
            AnalysisMessage::Response(r) => {
                entry.remaining_finals = entry.remaining_finals.saturating_sub(1);
                (AnalysisEvent::Final(r), entry.remaining_finals == 0)
            }
            AnalysisMessage::Error(e) if e.is_warning_only() => {
                warn!(%id, warning = %e.message(), "engine warning");
                (AnalysisEvent::Warning(e), false)
            }
            AnalysisMessage::Error(e) => (AnalysisEvent::Error(e), true),
        };

        let delivered = entry.tx.send(event).is_ok();
        if !delivered {
            debug!(%id, "subscriber gone, dropping query");
        }
        if closes || !delivered {
            subscribers.remove(&id);
        }
        delivered
    }
}

/// The receiving end of one query's stream.
pub struct Subscription {
    id: String,
    rx: Receiver<AnalysisEvent>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event, or `None` once the stream is over.
    pub fn recv(&self) -> Option<AnalysisEvent> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<AnalysisEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<AnalysisEvent, TryRecvError> {
        self.rx.try_recv()
    }

    /// Block until a final response arrives, skipping progressive updates.
    pub fn wait_final(&self, timeout: Duration) -> Result<Response, ProtocolError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| ProtocolError::Timeout(self.id.clone()))?;
            match self.rx.recv_timeout(remaining) {
                Ok(AnalysisEvent::Final(r)) => return Ok(r),
                Ok(AnalysisEvent::Error(e)) => {
                    return Err(ProtocolError::Rejected {
                        id: self.id.clone(),
                        message: e.message(),
                    });
                }
                Ok(AnalysisEvent::Update(_) | AnalysisEvent::Warning(_)) => continue,
                Err(RecvTimeoutError::Timeout) => return Err(ProtocolError::Timeout(self.id.clone())),
                Err(RecvTimeoutError::Disconnected) => return Err(ProtocolError::Closed(self.id.clone())),
            }
        }
    }

    /// Drain what has arrived and keep only the most recent result.
    pub fn latest(&self) -> Option<Response> {
        self.rx
            .try_iter()
            .filter_map(|event| match event {
                AnalysisEvent::Update(r) | AnalysisEvent::Final(r) => Some(r),
                _ => None,
            })
            .last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: &str, during: bool) -> AnalysisMessage {
        AnalysisMessage::Response(Response {
            id: id.into(),
            is_during_search: during,
            ..Response::default()
        })
    }

    fn error(id: &str, error: Option<&str>, warning: Option<&str>) -> AnalysisMessage {
        AnalysisMessage::Error(ErrorResponse {
            id: id.into(),
            error: error.map(Into::into),
            warning: warning.map(Into::into),
            field: None,
        })
    }

    #[test]
    fn test_updates_then_final_closes() {
        let router = AnalysisRouter::new();
        let sub = router.register("q1", 1);
        assert!(router.dispatch(response("q1", true)));
        assert!(router.dispatch(response("q1", true)));
        assert!(router.dispatch(response("q1", false)));
        assert!(!router.is_pending("q1"));
        // Late message after the final is ignored.
        assert!(!router.dispatch(response("q1", false)));

        assert!(matches!(sub.recv(), Some(AnalysisEvent::Update(_))));
        assert!(matches!(sub.recv(), Some(AnalysisEvent::Update(_))));
        assert!(matches!(sub.recv(), Some(AnalysisEvent::Final(_))));
        assert!(sub.recv().is_none());
    }

    #[test]
    fn test_one_final_per_turn() {
        let router = AnalysisRouter::new();
        let sub = router.register("q1", 2);
        router.dispatch(response("q1", false));
        assert!(router.is_pending("q1"));
        router.dispatch(response("q1", false));
        assert!(!router.is_pending("q1"));
        assert!(sub.wait_final(Duration::from_secs(1)).is_ok());
        assert!(sub.wait_final(Duration::from_secs(1)).is_ok());
        assert!(matches!(sub.wait_final(Duration::from_secs(1)), Err(ProtocolError::Closed(_))));
    }

    #[test]
    fn test_warning_keeps_stream_error_closes() {
        let router = AnalysisRouter::new();
        let sub = router.register("q1", 1);
        router.dispatch(error("q1", None, Some("WARNING_MESSAGE")));
        assert!(router.is_pending("q1"));
        router.dispatch(error("q1", Some("bad"), None));
        assert!(!router.is_pending("q1"));

        assert!(matches!(sub.recv(), Some(AnalysisEvent::Warning(_))));
        let err = sub.wait_final(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected { ref message, .. } if message == "bad"));
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let router = AnalysisRouter::new();
        let _sub = router.register("q1", 1);
        assert!(!router.dispatch(response("other", false)));
        assert!(router.is_pending("q1"));
    }

    #[test]
    fn test_dropped_subscription_cancels() {
        let router = AnalysisRouter::new();
        let sub = router.register("q1", 1);
        drop(sub);
        assert!(!router.dispatch(response("q1", true)));
        assert_eq!(router.pending(), 0);
    }

    #[test]
    fn test_ids_are_independent() {
        let router = AnalysisRouter::new();
        let a = router.register("a", 1);
        let b = router.register("b", 1);
        router.dispatch(error("a", Some("nope"), None));
        router.dispatch(response("b", false));
        assert!(a.wait_final(Duration::from_secs(1)).is_err());
        assert_eq!(b.wait_final(Duration::from_secs(1)).unwrap().id, "b");
    }

    #[test]
    fn test_latest_replaces() {
        let router = AnalysisRouter::new();
        let sub = router.register("q1", 1);
        for turn in 0..3 {
            router.dispatch(AnalysisMessage::Response(Response {
                id: "q1".into(),
                is_during_search: true,
                turn_number: turn,
                ..Response::default()
            }));
        }
        assert_eq!(sub.latest().unwrap().turn_number, 2);
        assert!(sub.latest().is_none());
    }
}
