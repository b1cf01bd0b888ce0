//! A source driven by hand from test code.

use crate::ack::Acknowledgment;
use crate::batch::Batch;
use crate::errors::StreamError;
use crate::observer::{Cancelable, Observable, Observer, Scheduler};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Source whose owner pushes batches and terminal signals explicitly.
///
/// The acknowledgment of every push is handed back to the caller, so a test
/// can play a well-behaved producer or deliberately break back-pressure.
pub struct ManualSource<T> {
    observer: Mutex<Option<Arc<dyn Observer<T>>>>,
    subscriptions: AtomicUsize,
    canceled: Arc<AtomicBool>,
}

impl<T> ManualSource<T> {
    /// Creates a source nobody has subscribed to yet.
    pub fn new() -> Self {
        Self {
            observer: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pushes `items` as one batch.
    ///
    /// Returns `Stop` when nobody is subscribed or the subscription was
    /// canceled.
    pub fn push(&self, items: Vec<T>) -> Acknowledgment {
        match self.current() {
            Some(observer) => observer.on_next(Batch::from(items)),
            None => Acknowledgment::STOP,
        }
    }

    /// Signals normal completion.
    pub fn complete(&self) {
        if let Some(observer) = self.current() {
            observer.on_completed();
        }
    }

    /// Signals failure.
    pub fn fail(&self, cause: StreamError) {
        if let Some(observer) = self.current() {
            observer.on_error(cause);
        }
    }

    /// `true` once the subscription handle was canceled.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Number of `subscribe` calls received.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::Acquire)
    }

    fn current(&self) -> Option<Arc<dyn Observer<T>>> {
        if self.is_canceled() {
            return None;
        }
        self.observer.lock().clone()
    }
}

impl<T> Default for ManualSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ManualSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualSource")
            .field("subscriptions", &self.subscription_count())
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

impl<T> Observable<T> for ManualSource<T>
where
    T: Send + 'static,
{
    fn subscribe(
        &self,
        observer: Arc<dyn Observer<T>>,
        _scheduler: Arc<dyn Scheduler>,
    ) -> Cancelable {
        self.subscriptions.fetch_add(1, Ordering::AcqRel);
        *self.observer.lock() = Some(observer);
        let canceled = Arc::clone(&self.canceled);
        Cancelable::new(move || canceled.store(true, Ordering::Release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::Ack;
    use crate::testing::recorder::RecordingObserver;

    #[derive(Debug)]
    struct Inline;

    impl Scheduler for Inline {
        fn execute(&self, task: crate::observer::Task) {
            task();
        }
    }

    #[test]
    fn test_push_without_subscriber_stops() {
        let source = ManualSource::<i32>::new();
        assert_eq!(source.push(vec![1]).value(), Some(Ack::Stop));
    }

    #[test]
    fn test_cancel_detaches_observer() {
        let source = ManualSource::<i32>::new();
        let observer = Arc::new(RecordingObserver::<i32>::new());
        let subscription = source.subscribe(observer.clone(), Arc::new(Inline));

        assert_eq!(source.push(vec![1, 2]).value(), Some(Ack::Continue));
        subscription.cancel();
        assert!(source.is_canceled());
        assert_eq!(source.push(vec![3]).value(), Some(Ack::Stop));
        assert_eq!(observer.items(), vec![1, 2]);
        assert_eq!(source.subscription_count(), 1);
    }
}
