//! Correlation of in-flight flag requests with their responses.
//!
//! Each call registers a one-shot waiter under its request key. The inbound
//! dispatch path resolves the oldest live waiter for the echoed key directly,
//! so callers wake as soon as their response arrives. Identical concurrent
//! requests are indistinguishable on the wire and are answered FIFO.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::types::{FlagOutcome, FlagRequest};

/// Registry of waiters keyed by `(name, tags)`.
#[derive(Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<FlagRequest, VecDeque<oneshot::Sender<FlagOutcome>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `request`.
    ///
    /// Dropping the returned [`PendingResponse`] (on timeout or cancellation)
    /// unregisters it.
    pub fn register(self: &Arc<Self>, request: FlagRequest) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .entry(request.clone())
            .or_default()
            .push_back(tx);

        PendingResponse {
            request,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Hands `outcome` to the oldest live waiter for `request`.
    ///
    /// Returns `false` when nobody is waiting, e.g. for a response that
    /// arrived after its call timed out.
    pub fn resolve(&self, request: &FlagRequest, outcome: FlagOutcome) -> bool {
        let mut waiters = self.waiters.lock();
        let Some(queue) = waiters.get_mut(request) else {
            return false;
        };

        let mut outcome = outcome;
        let mut delivered = false;
        while let Some(tx) = queue.pop_front() {
            match tx.send(outcome) {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                // Receiver already gone; try the next caller.
                Err(returned) => outcome = returned,
            }
        }

        if queue.is_empty() {
            waiters.remove(request);
        }
        delivered
    }

    /// Number of callers currently waiting, across all keys.
    pub fn len(&self) -> usize {
        self.waiters
            .lock()
            .values()
            .map(|queue| queue.iter().filter(|tx| !tx.is_closed()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, request: &FlagRequest) {
        let mut waiters = self.waiters.lock();
        if let Some(queue) = waiters.get_mut(request) {
            queue.retain(|tx| !tx.is_closed());
            if queue.is_empty() {
                waiters.remove(request);
            }
        }
    }
}

/// Future side of a registered waiter.
///
/// Resolves to `None` if the registry was torn down without an answer.
pub struct PendingResponse {
    request: FlagRequest,
    rx: oneshot::Receiver<FlagOutcome>,
    registry: Arc<PendingRequests>,
}

impl Future for PendingResponse {
    type Output = Option<FlagOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.rx.close();
        self.registry.prune(&self.request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tags;

    fn request(name: &str) -> FlagRequest {
        FlagRequest::new(name, Tags::new())
    }

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let pending = Arc::new(PendingRequests::new());
        let waiter = pending.register(request("a"));

        assert!(pending.resolve(&request("a"), FlagOutcome::Ok(true)));
        assert_eq!(waiter.await, Some(FlagOutcome::Ok(true)));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_resolve_without_waiter() {
        let pending = PendingRequests::new();
        assert!(!pending.resolve(&request("a"), FlagOutcome::Ok(true)));
    }

    #[tokio::test]
    async fn test_identical_requests_resolve_fifo() {
        let pending = Arc::new(PendingRequests::new());
        let first = pending.register(request("a"));
        let second = pending.register(request("a"));
        assert_eq!(pending.len(), 2);

        pending.resolve(&request("a"), FlagOutcome::Ok(true));
        pending.resolve(&request("a"), FlagOutcome::Ok(false));

        assert_eq!(first.await, Some(FlagOutcome::Ok(true)));
        assert_eq!(second.await, Some(FlagOutcome::Ok(false)));
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped() {
        let pending = Arc::new(PendingRequests::new());
        let abandoned = pending.register(request("a"));
        let live = pending.register(request("a"));

        drop(abandoned);
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve(&request("a"), FlagOutcome::Error("boom".into())));
        assert_eq!(live.await, Some(FlagOutcome::Error("boom".into())));
    }

    #[test]
    fn test_drop_unregisters() {
        let pending = Arc::new(PendingRequests::new());
        let waiter = pending.register(request("a"));
        drop(waiter);

        assert!(pending.is_empty());
        assert!(!pending.resolve(&request("a"), FlagOutcome::Ok(true)));
    }

    #[tokio::test]
    async fn test_tags_are_part_of_the_key() {
        let pending = Arc::new(PendingRequests::new());
        let tagged = FlagRequest::new("a", Tags::new().with("env", "prod"));
        let waiter = pending.register(tagged.clone());

        assert!(!pending.resolve(&request("a"), FlagOutcome::Ok(true)));
        assert!(pending.resolve(&tagged, FlagOutcome::Ok(false)));
        assert_eq!(waiter.await, Some(FlagOutcome::Ok(false)));
    }
}
