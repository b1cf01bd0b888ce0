//! A recording downstream observer with scripted acknowledgments.

use crate::ack::{Ack, AckPromise, Acknowledgment};
use crate::batch::Batch;
use crate::errors::StreamError;
use crate::observer::Observer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::Notify;

/// How a [`RecordingObserver`] answers one `on_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckScript {
    /// Answer with an already settled `Continue`.
    #[default]
    Continue,
    /// Answer with an already settled `Stop`.
    Stop,
    /// Answer with a pending promise the test settles through
    /// [`RecordingObserver::resolve_next`].
    Pending,
}

/// One signal received by a [`RecordingObserver`].
#[derive(Debug, Clone)]
pub enum Recorded<T> {
    /// A batch delivered through `on_next`.
    Next(Vec<T>),
    /// The terminal error.
    Error(StreamError),
    /// Normal completion.
    Completed,
}

/// Observer that records every signal for later assertions.
pub struct RecordingObserver<T> {
    script: Mutex<VecDeque<AckScript>>,
    fallback: AckScript,
    events: Mutex<Vec<Recorded<T>>>,
    pending: Mutex<VecDeque<AckPromise>>,
    terminated: Notify,
}

impl<T> RecordingObserver<T> {
    /// Answers every batch with `Continue`.
    pub fn new() -> Self {
        Self::with_script(AckScript::Continue)
    }

    /// Answers every batch according to `script`.
    pub fn with_script(script: AckScript) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: script,
            events: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            terminated: Notify::new(),
        }
    }

    /// Answers the first batches from `sequence`, then with `Continue`.
    pub fn with_sequence<I>(sequence: I) -> Self
    where
        I: IntoIterator<Item = AckScript>,
    {
        let observer = Self::new();
        observer.script.lock().extend(sequence);
        observer
    }

    /// Settles the oldest pending acknowledgment with `ack`.
    ///
    /// Returns `false` when nothing is pending.
    pub fn resolve_next(&self, ack: Ack) -> bool {
        let promise = self.pending.lock().pop_front();
        promise.is_some_and(|promise| promise.try_resolve(ack))
    }

    /// Pending acknowledgments handed out and not yet settled by the test.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of `on_completed` calls received.
    pub fn completions(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Recorded::Completed))
            .count()
    }

    /// Every error received, in order.
    pub fn errors(&self) -> Vec<StreamError> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Recorded::Error(cause) => Some(cause.clone()),
                _ => None,
            })
            .collect()
    }

    /// `true` once a completion or an error arrived.
    pub fn is_terminated(&self) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| !matches!(event, Recorded::Next(_)))
    }

    /// Waits until a completion or an error arrives.
    pub async fn wait_for_termination(&self) {
        loop {
            let notified = self.terminated.notified();
            if self.is_terminated() {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, event: Recorded<T>) {
        let terminal = !matches!(event, Recorded::Next(_));
        self.events.lock().push(event);
        if terminal {
            self.terminated.notify_waiters();
        }
    }
}

impl<T: Clone> RecordingObserver<T> {
    /// Every signal received, in order.
    pub fn events(&self) -> Vec<Recorded<T>> {
        self.events.lock().clone()
    }

    /// Every batch received, in order.
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Recorded::Next(items) => Some(items.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every element received, flattened across batches.
    pub fn items(&self) -> Vec<T> {
        self.batches().into_iter().flatten().collect()
    }
}

impl<T> Default for RecordingObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RecordingObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingObserver")
            .field("fallback", &self.fallback)
            .field("events", &self.events.lock().len())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl<T> Observer<T> for RecordingObserver<T>
where
    T: Send + 'static,
{
    fn on_next(&self, batch: Batch<T>) -> Acknowledgment {
        self.record(Recorded::Next(batch.into_inner()));
        let script = self.script.lock().pop_front().unwrap_or(self.fallback);
        match script {
            AckScript::Continue => Acknowledgment::CONTINUE,
            AckScript::Stop => Acknowledgment::STOP,
            AckScript::Pending => {
                let promise = AckPromise::new();
                self.pending.lock().push_back(promise.clone());
                Acknowledgment::Pending(promise)
            }
        }
    }

    fn on_error(&self, cause: StreamError) {
        self.record(Recorded::Error(cause));
    }

    fn on_completed(&self) {
        self.record(Recorded::Completed);
    }
}
