//! Assertions over streams recorded by a [`RecordingObserver`].

use super::recorder::{Recorded, RecordingObserver};
use crate::ack::{Ack, Acknowledgment};
use crate::errors::StreamError;
use std::fmt::Debug;

/// Asserts that exactly `expected` was delivered, across all batches.
///
/// # Panics
/// Panics if the delivered elements differ from `expected`.
#[track_caller]
pub fn assert_pairs<T>(observer: &RecordingObserver<T>, expected: &[T])
where
    T: Clone + PartialEq + Debug,
{
    assert_eq!(
        observer.items(),
        expected,
        "unexpected elements delivered downstream"
    );
}

/// Asserts that the stream completed exactly once and never failed.
///
/// # Panics
/// Panics on a missing or repeated completion, or on any error.
#[track_caller]
pub fn assert_completed_once<T>(observer: &RecordingObserver<T>) {
    assert!(
        observer.errors().is_empty(),
        "expected completion, got errors: {:?}",
        observer.errors()
    );
    assert_eq!(observer.completions(), 1, "expected exactly one completion");
}

/// Asserts that the stream failed exactly once and never completed, and
/// returns the error.
///
/// # Panics
/// Panics on a missing or repeated error, or on any completion.
#[track_caller]
pub fn assert_failed_once<T>(observer: &RecordingObserver<T>) -> StreamError {
    assert_eq!(
        observer.completions(),
        0,
        "expected an error, got a completion"
    );
    let mut errors = observer.errors();
    assert_eq!(
        errors.len(),
        1,
        "expected exactly one error, got {errors:?}"
    );
    errors.remove(0)
}

/// Asserts that no terminal signal was delivered.
///
/// # Panics
/// Panics if a completion or an error was delivered.
#[track_caller]
pub fn assert_not_terminated<T>(observer: &RecordingObserver<T>) {
    assert!(!observer.is_terminated(), "stream terminated unexpectedly");
}

/// Asserts that nothing follows the first terminal signal.
///
/// # Panics
/// Panics if a batch or a second terminal signal follows the first one.
#[track_caller]
pub fn assert_terminal_is_last<T>(observer: &RecordingObserver<T>)
where
    T: Clone + Debug,
{
    let events = observer.events();
    if let Some(position) = events
        .iter()
        .position(|event| !matches!(event, Recorded::Next(_)))
    {
        assert_eq!(
            position + 1,
            events.len(),
            "signals after termination: {:?}",
            &events[position + 1..]
        );
    }
}

/// Asserts the settled value of `ack`; `None` means still pending.
///
/// # Panics
/// Panics if the acknowledgment's state differs from `expected`.
#[track_caller]
pub fn assert_ack(ack: &Acknowledgment, expected: Option<Ack>) {
    assert_eq!(ack.value(), expected, "unexpected acknowledgment state");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::observer::Observer;

    #[test]
    fn test_assertions_accept_well_formed_stream() {
        let observer = RecordingObserver::new();
        let _ = observer.on_next(Batch::from(vec![(1, 'a')]));
        observer.on_completed();

        assert_pairs(&observer, &[(1, 'a')]);
        assert_completed_once(&observer);
        assert_terminal_is_last(&observer);
    }

    #[test]
    #[should_panic(expected = "signals after termination")]
    fn test_batch_after_completion_is_rejected() {
        let observer = RecordingObserver::new();
        observer.on_completed();
        let _ = observer.on_next(Batch::from(vec![1]));
        assert_terminal_is_last(&observer);
    }
}
