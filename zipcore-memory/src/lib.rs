//! In-memory sources and schedulers for `zipcore`
//!
//! This crate provides producers and execution contexts that need nothing but
//! memory, for tests, examples and benchmarks:
//!
//! - [`ImmediateScheduler`] runs every task inline on the calling thread
//! - [`TokioScheduler`] spawns every task on a tokio runtime
//! - [`IterSource`] replays a fixed list of batches, honoring back-pressure

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, trace};
use zipcore::{Ack, Batch, Cancelable, Observable, Observer, Scheduler, StreamError, Task};

/// Errors raised while setting up in-memory collaborators.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A tokio scheduler was requested outside a runtime.
    #[error("no tokio runtime is running on this thread")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Runs each task immediately on the caller's stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Spawns each task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedules onto the runtime behind `handle`.
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedules onto the runtime the caller is running on.
    pub fn current() -> Result<Self, MemoryError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn execute(&self, task: Task) {
        drop(self.handle.spawn(async move { task() }));
    }
}

/// What an [`IterSource`] signals once every batch was acknowledged.
#[derive(Debug, Clone)]
pub enum Ending {
    /// Signal `on_completed`.
    Complete,
    /// Signal `on_error` with the given cause.
    Fail(StreamError),
    /// Signal nothing; the subscription stays open until canceled.
    Never,
}

/// Source that replays a fixed list of batches to every subscriber.
///
/// The next batch is pushed only after the previous one was acknowledged
/// with `Continue`; a `Stop` or a cancellation ends the subscription.
/// Continuations after an asynchronous acknowledgment run on the scheduler
/// given at subscription time.
#[derive(Debug, Clone)]
pub struct IterSource<T> {
    batches: Vec<Vec<T>>,
    ending: Ending,
}

impl<T> IterSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Replays `batches` in order, then completes.
    pub fn new<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<T>>,
    {
        Self {
            batches: batches.into_iter().collect(),
            ending: Ending::Complete,
        }
    }

    /// Cuts `values` into batches of at most `size` elements.
    pub fn chunked<I>(values: I, size: usize) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        Self::new(values.chunks(size.max(1)).map(<[T]>::to_vec))
    }

    /// Fails with `cause` instead of completing.
    #[must_use]
    pub fn failing_with(mut self, cause: StreamError) -> Self {
        self.ending = Ending::Fail(cause);
        self
    }

    /// Never signals termination after the last batch.
    #[must_use]
    pub fn never_ending(mut self) -> Self {
        self.ending = Ending::Never;
        self
    }
}

impl<T> Observable<T> for IterSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(
        &self,
        observer: Arc<dyn Observer<T>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Cancelable {
        let pump = Arc::new(Pump {
            observer,
            scheduler: Arc::clone(&scheduler),
            remaining: Mutex::new(self.batches.iter().cloned().collect()),
            ending: self.ending.clone(),
            canceled: AtomicBool::new(false),
        });
        debug!(batches = self.batches.len(), "iter source subscribed");

        let running = Arc::clone(&pump);
        scheduler.execute(Box::new(move || running.run()));

        Cancelable::new(move || {
            trace!("iter source canceled");
            pump.canceled.store(true, Ordering::Release);
        })
    }
}

/// One subscription's replay state.
struct Pump<T> {
    observer: Arc<dyn Observer<T>>,
    scheduler: Arc<dyn Scheduler>,
    remaining: Mutex<VecDeque<Vec<T>>>,
    ending: Ending,
    canceled: AtomicBool,
}

impl<T> Pump<T>
where
    T: Send + 'static,
{
    /// Pushes batches while acknowledgments come back settled with
    /// `Continue`; a pending acknowledgment reschedules the rest.
    fn run(self: Arc<Self>) {
        loop {
            if self.canceled.load(Ordering::Acquire) {
                return;
            }
            let next = self.remaining.lock().pop_front();
            let Some(items) = next else {
                self.finish();
                return;
            };

            trace!(len = items.len(), "iter source pushing batch");
            let ack = self.observer.on_next(Batch::from(items));
            match ack.value() {
                Some(Ack::Continue) => {}
                Some(Ack::Stop) => {
                    debug!("iter source stopped by consumer");
                    return;
                }
                None => {
                    let pump = Arc::clone(&self);
                    ack.on_complete(move |ack| {
                        if ack.is_stop() {
                            debug!("iter source stopped by consumer");
                            return;
                        }
                        let scheduler = Arc::clone(&pump.scheduler);
                        scheduler.execute(Box::new(move || pump.run()));
                    });
                    return;
                }
            }
        }
    }

    fn finish(&self) {
        match &self.ending {
            Ending::Complete => self.observer.on_completed(),
            Ending::Fail(cause) => self.observer.on_error(cause.clone()),
            Ending::Never => {}
        }
    }
}

impl<T> fmt::Debug for Pump<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pump")
            .field("remaining", &self.remaining.lock().len())
            .field("canceled", &self.canceled.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;
    use zipcore::testing::prelude::*;

    #[test]
    fn test_replays_batches_then_completes() {
        let source = IterSource::new(vec![vec![1, 2], vec![3]]);
        let observer = Arc::new(RecordingObserver::<i32>::new());

        let _subscription = source.subscribe(observer.clone(), Arc::new(ImmediateScheduler));

        assert_eq!(observer.batches(), vec![vec![1, 2], vec![3]]);
        assert_completed_once(&observer);
    }

    #[test]
    fn test_source_is_usable_as_shared_observable() {
        let source: Arc<dyn Observable<String>> =
            Arc::new(IterSource::new(vec![vec!["fill".to_string()]]));
        let observer = Arc::new(RecordingObserver::<String>::new());

        let _subscription = source.subscribe(observer.clone(), Arc::new(ImmediateScheduler));

        assert_eq!(observer.items(), vec!["fill".to_string()]);
        assert_completed_once(&observer);
    }

    #[test]
    fn test_waits_for_pending_ack() {
        let source = IterSource::chunked(1..=5, 2);
        let observer = Arc::new(RecordingObserver::<i32>::with_script(AckScript::Pending));

        let _subscription = source.subscribe(observer.clone(), Arc::new(ImmediateScheduler));
        assert_eq!(observer.batches(), vec![vec![1, 2]]);

        assert!(observer.resolve_next(Ack::Continue));
        assert_eq!(observer.items(), vec![1, 2, 3, 4]);
        assert_not_terminated(&observer);

        assert!(observer.resolve_next(Ack::Continue));
        assert!(observer.resolve_next(Ack::Continue));
        assert_eq!(observer.items(), vec![1, 2, 3, 4, 5]);
        assert_completed_once(&observer);
    }

    #[test]
    #[traced_test]
    fn test_stop_ends_replay_without_signal() {
        let source = IterSource::new(vec![vec![1], vec![2]]);
        let observer = Arc::new(RecordingObserver::<i32>::with_script(AckScript::Stop));

        let _subscription = source.subscribe(observer.clone(), Arc::new(ImmediateScheduler));

        assert_eq!(observer.items(), vec![1]);
        assert_not_terminated(&observer);
        assert!(logs_contain("iter source stopped by consumer"));
    }

    #[test]
    fn test_cancel_ends_replay() {
        let source = IterSource::new(vec![vec![1], vec![2]]);
        let observer = Arc::new(RecordingObserver::<i32>::with_script(AckScript::Pending));

        let subscription = source.subscribe(observer.clone(), Arc::new(ImmediateScheduler));
        subscription.cancel();
        assert!(observer.resolve_next(Ack::Continue));

        assert_eq!(observer.items(), vec![1]);
        assert_not_terminated(&observer);
    }

    #[test]
    fn test_failing_source_reports_error_after_last_batch() {
        let source = IterSource::new(vec![vec![1]])
            .failing_with(StreamError::upstream_message("disk gone"));
        let observer = Arc::new(RecordingObserver::<i32>::new());

        let _subscription = source.subscribe(observer.clone(), Arc::new(ImmediateScheduler));

        assert_eq!(observer.items(), vec![1]);
        assert!(assert_failed_once(&observer).is_upstream());
    }

    #[test]
    fn test_tokio_scheduler_requires_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(MemoryError::NoRuntime(_))
        ));
    }
}
