//! Push-based stream contracts.
//!
//! An [`Observable`] pushes batches into an [`Observer`]. Every
//! [`Observer::on_next`] returns an [`Acknowledgment`]; a well-behaved
//! producer does not push again until that acknowledgment settles with
//! [`Ack::Continue`](crate::ack::Ack::Continue). `on_completed` and
//! `on_error` may arrive without waiting for the last acknowledgment, and at
//! most one of them is ever delivered.

use crate::ack::Acknowledgment;
use crate::batch::Batch;
use crate::errors::StreamError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receiver side of a push-based stream.
pub trait Observer<T>: Send + Sync {
    /// Receives the next batch; the returned acknowledgment gates the next push.
    fn on_next(&self, batch: Batch<T>) -> Acknowledgment;

    /// Receives the terminal error.
    fn on_error(&self, cause: StreamError);

    /// Receives normal completion.
    fn on_completed(&self);
}

/// Producer side of a push-based stream.
pub trait Observable<T>: Send + Sync {
    /// Starts pushing into `observer`.
    ///
    /// The scheduler is the execution context producer callbacks run on.
    /// Cancelling the returned handle stops the subscription.
    fn subscribe(
        &self,
        observer: Arc<dyn Observer<T>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Cancelable;
}

/// Unit of work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Opaque execution context for producer callbacks.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Runs `task`, now or later, on some execution context.
    fn execute(&self, task: Task);
}

/// Handle that tears a subscription down at most once.
pub struct Cancelable {
    action: Mutex<Option<Task>>,
    canceled: AtomicBool,
}

impl Cancelable {
    /// Runs `action` on the first call to [`Cancelable::cancel`].
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
            canceled: AtomicBool::new(false),
        }
    }

    /// A handle with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            action: Mutex::new(None),
            canceled: AtomicBool::new(false),
        }
    }

    /// Cancels every handle in `parts`, in order, on the first cancel.
    pub fn composite<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let parts: Vec<Self> = parts.into_iter().collect();
        Self::new(move || {
            for part in &parts {
                part.cancel();
            }
        })
    }

    /// Tears the subscription down. Later calls do nothing.
    pub fn cancel(&self) {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Returns `true` once [`Cancelable::cancel`] has been called.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Cancelable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancelable")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}
