//! Acknowledgments returned by every `on_next` call.
//!
//! An [`Acknowledgment`] tells a producer whether it may push another batch.
//! It is either already settled ([`Acknowledgment::Ready`]) or backed by an
//! [`AckPromise`] that some downstream party resolves later. Promises settle
//! exactly once; continuations registered on them run in registration order,
//! on the stack of whoever resolves the promise, and never while the
//! promise's internal lock is held.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// The settled value of an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ack {
    /// The producer may push its next batch.
    Continue,
    /// The producer must stop; no further batches will be accepted.
    Stop,
}

impl Ack {
    /// Returns `true` for [`Ack::Continue`].
    pub const fn is_continue(self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns `true` for [`Ack::Stop`].
    pub const fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("continue"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

type Continuation = Box<dyn FnOnce(Ack) + Send + 'static>;

enum PromiseState {
    Pending {
        continuations: Vec<Continuation>,
        wakers: Vec<Waker>,
    },
    Resolved(Ack),
}

/// A pending acknowledgment that is resolved later.
///
/// Clones share the same underlying slot: resolving any clone settles all of
/// them.
#[derive(Clone)]
pub struct AckPromise {
    inner: Arc<Mutex<PromiseState>>,
}

impl AckPromise {
    /// Creates an unresolved promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseState::Pending {
                continuations: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// Settles the promise, returning `false` if it was already settled.
    ///
    /// Queued continuations run synchronously after the internal lock is
    /// released. A continuation that resolves this same promise again gets
    /// `false` back and changes nothing.
    pub fn try_resolve(&self, ack: Ack) -> bool {
        let previous = {
            let mut state = self.inner.lock();
            if let PromiseState::Resolved(_) = *state {
                return false;
            }
            std::mem::replace(&mut *state, PromiseState::Resolved(ack))
        };

        if let PromiseState::Pending {
            continuations,
            wakers,
        } = previous
        {
            for waker in wakers {
                waker.wake();
            }
            for continuation in continuations {
                continuation(ack);
            }
        }
        true
    }

    /// Settles the promise.
    ///
    /// Resolving twice is a no-op in release builds and a debug assertion
    /// failure in debug builds.
    pub fn resolve(&self, ack: Ack) {
        let settled = self.try_resolve(ack);
        debug_assert!(settled, "acknowledgment resolved more than once");
    }

    /// Returns the settled value, if any.
    pub fn value(&self) -> Option<Ack> {
        match *self.inner.lock() {
            PromiseState::Resolved(ack) => Some(ack),
            PromiseState::Pending { .. } => None,
        }
    }

    /// Returns `true` once the promise has been settled.
    pub fn is_resolved(&self) -> bool {
        self.value().is_some()
    }

    /// Registers a continuation that runs once with the settled value.
    ///
    /// Runs immediately on the caller's stack when the promise is already
    /// settled.
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce(Ack) + Send + 'static,
    {
        let settled = {
            let mut state = self.inner.lock();
            match &mut *state {
                PromiseState::Pending { continuations, .. } => {
                    continuations.push(Box::new(continuation));
                    return;
                }
                PromiseState::Resolved(ack) => *ack,
            }
        };
        continuation(settled);
    }

    fn poll_value(&self, cx: &Context<'_>) -> Poll<Ack> {
        let mut state = self.inner.lock();
        match &mut *state {
            PromiseState::Resolved(ack) => Poll::Ready(*ack),
            PromiseState::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl Default for AckPromise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AckPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckPromise")
            .field("value", &self.value())
            .finish()
    }
}

/// The value every `on_next` returns to its caller.
#[derive(Debug, Clone)]
pub enum Acknowledgment {
    /// Already settled.
    Ready(Ack),
    /// Settled later through the promise.
    Pending(AckPromise),
}

impl Acknowledgment {
    /// An acknowledgment already settled with [`Ack::Continue`].
    pub const CONTINUE: Self = Self::Ready(Ack::Continue);

    /// An acknowledgment already settled with [`Ack::Stop`].
    pub const STOP: Self = Self::Ready(Ack::Stop);

    /// Returns the settled value, if any.
    pub fn value(&self) -> Option<Ack> {
        match self {
            Self::Ready(ack) => Some(*ack),
            Self::Pending(promise) => promise.value(),
        }
    }

    /// Returns `true` once the acknowledgment has been settled.
    pub fn is_ready(&self) -> bool {
        self.value().is_some()
    }

    /// Registers a continuation that runs once with the settled value.
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce(Ack) + Send + 'static,
    {
        match self {
            Self::Ready(ack) => continuation(*ack),
            Self::Pending(promise) => promise.on_complete(continuation),
        }
    }

    /// Resolves `promise` with this acknowledgment's value once it settles.
    ///
    /// A promise that was settled elsewhere in the meantime keeps its value.
    pub fn link_to(&self, promise: &AckPromise) {
        let target = promise.clone();
        self.on_complete(move |ack| {
            target.try_resolve(ack);
        });
    }
}

impl From<Ack> for Acknowledgment {
    fn from(ack: Ack) -> Self {
        Self::Ready(ack)
    }
}

impl From<AckPromise> for Acknowledgment {
    fn from(promise: AckPromise) -> Self {
        Self::Pending(promise)
    }
}

impl Future for Acknowledgment {
    type Output = Ack;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &*self {
            Self::Ready(ack) => Poll::Ready(*ack),
            Self::Pending(promise) => promise.poll_value(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_ready_acknowledgment_reports_value() {
        assert_eq!(Acknowledgment::CONTINUE.value(), Some(Ack::Continue));
        assert_eq!(Acknowledgment::STOP.value(), Some(Ack::Stop));
        assert!(Acknowledgment::from(Ack::Stop).is_ready());
    }

    #[test]
    fn test_promise_resolves_once() {
        let promise = AckPromise::new();
        assert!(!promise.is_resolved());
        assert!(promise.try_resolve(Ack::Continue));
        assert!(!promise.try_resolve(Ack::Stop));
        assert_eq!(promise.value(), Some(Ack::Continue));
    }

    #[test]
    fn test_continuations_run_in_registration_order() {
        let promise = AckPromise::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            promise.on_complete(move |ack| order.lock().push((i, ack)));
        }
        assert!(order.lock().is_empty());

        promise.resolve(Ack::Stop);
        assert_eq!(
            *order.lock(),
            vec![(0, Ack::Stop), (1, Ack::Stop), (2, Ack::Stop)]
        );
    }

    #[test]
    fn test_continuation_on_settled_promise_runs_immediately() {
        let promise = AckPromise::new();
        promise.resolve(Ack::Continue);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        promise.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_resolve_from_continuation_is_rejected() {
        let promise = AckPromise::new();
        let reentered = Arc::new(Mutex::new(None));

        let inner = promise.clone();
        let seen = Arc::clone(&reentered);
        promise.on_complete(move |_| {
            *seen.lock() = Some(inner.try_resolve(Ack::Stop));
        });

        promise.resolve(Ack::Continue);
        assert_eq!(*reentered.lock(), Some(false));
        assert_eq!(promise.value(), Some(Ack::Continue));
    }

    #[test]
    fn test_continuation_may_register_on_same_promise() {
        let promise = AckPromise::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = promise.clone();
        let counter = Arc::clone(&hits);
        promise.on_complete(move |_| {
            let counter = Arc::clone(&counter);
            inner.on_complete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        promise.resolve(Ack::Continue);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_link_to_forwards_value() {
        let upstream = AckPromise::new();
        let downstream = AckPromise::new();
        Acknowledgment::from(upstream.clone()).link_to(&downstream);

        assert!(!downstream.is_resolved());
        upstream.resolve(Ack::Stop);
        assert_eq!(downstream.value(), Some(Ack::Stop));
    }

    #[test]
    fn test_link_to_keeps_earlier_value() {
        let upstream = AckPromise::new();
        let downstream = AckPromise::new();
        Acknowledgment::from(upstream.clone()).link_to(&downstream);

        downstream.resolve(Ack::Stop);
        upstream.resolve(Ack::Continue);
        assert_eq!(downstream.value(), Some(Ack::Stop));
    }

    #[test]
    fn test_acknowledgment_future_wakes_on_resolve() {
        let promise = AckPromise::new();
        let mut fut = task::spawn(Acknowledgment::from(promise.clone()));

        assert_pending!(fut.poll());
        promise.resolve(Ack::Continue);
        assert!(fut.is_woken());
        assert_ready_eq!(fut.poll(), Ack::Continue);
    }

    #[tokio::test]
    async fn test_acknowledgment_resolved_from_other_task() {
        let promise = AckPromise::new();
        let resolver = promise.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            resolver.resolve(Ack::Stop);
        });

        let ack = Acknowledgment::from(promise).await;
        assert_eq!(ack, Ack::Stop);
        handle.await.unwrap();
    }

    #[test]
    fn test_block_on_acknowledgment_settled_from_thread() {
        let promise = AckPromise::new();
        let resolver = promise.clone();
        let handle = std::thread::spawn(move || resolver.resolve(Ack::Continue));

        let ack = futures::executor::block_on(Acknowledgment::from(promise));
        assert_eq!(ack, Ack::Continue);
        handle.join().unwrap();
    }
}
