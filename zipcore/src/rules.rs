//! User predicates steering the pairing loop.
//!
//! For the current left value `l` and right value `r`:
//! - `matches(l, r)` decides whether `(l, r)` is emitted
//! - `request_left(l, r)` decides whether the left cursor advances
//! - `request_right(l, r)` decides whether the right cursor advances
//!
//! At least one of the two request predicates must hold for every pair.
//! Predicates may fail by returning an error or by panicking; either ends the
//! stream with a [`StreamError`].

use crate::errors::{BoxError, PredicateKind, StreamError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A fallible predicate over the current left and right values.
pub type Predicate<L, R> = Box<dyn Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static>;

/// The three predicates of a controlled zip.
pub struct ZipRules<L, R> {
    matches: Predicate<L, R>,
    request_left: Predicate<L, R>,
    request_right: Predicate<L, R>,
}

impl<L, R> ZipRules<L, R>
where
    L: 'static,
    R: 'static,
{
    /// Builds rules from fallible predicates.
    pub fn new<M, RL, RR>(matches: M, request_left: RL, request_right: RR) -> Self
    where
        M: Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static,
        RL: Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static,
        RR: Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        Self {
            matches: Box::new(matches),
            request_left: Box::new(request_left),
            request_right: Box::new(request_right),
        }
    }

    /// Builds rules from predicates that cannot fail.
    pub fn infallible<M, RL, RR>(matches: M, request_left: RL, request_right: RR) -> Self
    where
        M: Fn(&L, &R) -> bool + Send + Sync + 'static,
        RL: Fn(&L, &R) -> bool + Send + Sync + 'static,
        RR: Fn(&L, &R) -> bool + Send + Sync + 'static,
    {
        Self::new(
            move |l, r| Ok(matches(l, r)),
            move |l, r| Ok(request_left(l, r)),
            move |l, r| Ok(request_right(l, r)),
        )
    }

    /// Plain zip: every pair matches and both sides advance together.
    pub fn lockstep() -> Self {
        Self::infallible(|_, _| true, |_, _| true, |_, _| true)
    }

    /// Replaces the match predicate.
    #[must_use]
    pub fn with_match<F>(mut self, matches: F) -> Self
    where
        F: Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.matches = Box::new(matches);
        self
    }

    /// Replaces the left request predicate.
    #[must_use]
    pub fn with_request_left<F>(mut self, request_left: F) -> Self
    where
        F: Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.request_left = Box::new(request_left);
        self
    }

    /// Replaces the right request predicate.
    #[must_use]
    pub fn with_request_right<F>(mut self, request_right: F) -> Self
    where
        F: Fn(&L, &R) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.request_right = Box::new(request_right);
        self
    }
}

impl<T> ZipRules<T, T>
where
    T: Ord + 'static,
{
    /// Merge join over two ascending streams: emits values present on both
    /// sides and advances whichever side holds the smaller value.
    pub fn sorted_join() -> Self {
        Self::infallible(|l, r| l == r, |l, r| l <= r, |l, r| r <= l)
    }
}

impl<L, R> ZipRules<L, R> {
    /// Evaluates one predicate, turning errors and panics into stream errors.
    pub(crate) fn evaluate(
        &self,
        kind: PredicateKind,
        left: &L,
        right: &R,
    ) -> Result<bool, StreamError> {
        let predicate = match kind {
            PredicateKind::Match => &self.matches,
            PredicateKind::RequestLeft => &self.request_left,
            PredicateKind::RequestRight => &self.request_right,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| predicate(left, right))) {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(source)) => Err(StreamError::Predicate {
                predicate: kind,
                source: Arc::from(source),
            }),
            Err(payload) => Err(StreamError::PredicatePanicked {
                predicate: kind,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl<L, R> std::fmt::Debug for ZipRules<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipRules").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
