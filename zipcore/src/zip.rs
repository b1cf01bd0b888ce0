//! The controlled zip orchestrator.
//!
//! [`ControlledZip`] subscribes to a left and a right source and turns their
//! batches into a single stream of matched `(left, right)` pairs. Matching is
//! steered by [`ZipRules`]; back-pressure is enforced through
//! acknowledgments:
//!
//! - a source whose batch is used up gets an acknowledgment that settles only
//!   after the downstream acknowledged the pairs that batch produced
//! - a source whose batch still has unmatched elements stays buffered, and its
//!   acknowledgment stays pending until the other side catches up
//!
//! All shared state lives in one record behind one lock. The lock is held
//! only while that record is read or written: never while a predicate runs,
//! never while the downstream is called, and never while an acknowledgment is
//! resolved. Producers and consumers may therefore re-enter the combinator
//! from inside any callback.

use crate::ack::{Ack, AckPromise, Acknowledgment};
use crate::batch::{Batch, Cursor};
use crate::config::ZipConfig;
use crate::errors::{
    DiagnosticContext, InvariantViolation, PredicateKind, StreamError, StreamResult, ViolationKind,
};
use crate::metrics::{MetricsSnapshot, ZipMetrics};
use crate::observer::{Cancelable, Observable, Observer, Scheduler};
use crate::rules::ZipRules;
use crate::state::{
    measure, Buffered, MeasuredState, Side, TerminationKind, TerminationState, ZipState,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, instrument, trace, warn};

type Downstream<L, R> = Arc<dyn Observer<(L, R)>>;

/// Read-only view of a combinator's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipStatus {
    /// The measured state.
    pub state: MeasuredState,
    /// Completion and failure status of the sources.
    pub termination: TerminationKind,
    /// Left elements buffered awaiting a right counterpart.
    pub left_buffered: usize,
    /// Right elements buffered awaiting a left counterpart.
    pub right_buffered: usize,
}

/// Why the stream stopped without a terminal signal to the downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Canceled,
    DownstreamStopped,
}

struct Shared<L, R> {
    state: ZipState<L, R>,
    termination: TerminationState,
    halted: Option<Halt>,
    /// Source acks waiting on a downstream ack; released with `Stop` on teardown.
    chained: Vec<AckPromise>,
}

enum Signal {
    Completed,
    Failed(StreamError),
    Silent,
}

/// Work left for the thread that stopped the stream, done outside the lock.
struct Teardown {
    signal: Signal,
    release: Vec<AckPromise>,
}

/// Current value of a side plus the rest of its batch.
struct Head<T> {
    value: T,
    cursor: Cursor<T>,
}

impl<T> Head<T> {
    fn from_batch(batch: Batch<T>) -> Option<Self> {
        let mut cursor = batch.into_cursor();
        cursor.next().map(|value| Self { value, cursor })
    }

    fn buffer(self, ack: AckPromise) -> Buffered<T> {
        Buffered {
            value: self.value,
            cursor: self.cursor,
            ack,
        }
    }
}

enum Arrival<L, R> {
    Left(Head<L>),
    Right(Head<R>),
}

impl<L, R> Arrival<L, R> {
    const fn side(&self) -> Side {
        match self {
            Self::Left(_) => Side::Left,
            Self::Right(_) => Side::Right,
        }
    }
}

/// What a pairing loop left behind.
enum Remainder<L, R> {
    /// Both batches were used up together.
    Neither,
    /// The right batch ran out; the left still holds elements.
    Left(Head<L>),
    /// The left batch ran out; the right still holds elements.
    Right(Head<R>),
    /// A predicate failed or the loop broke an invariant.
    Failed(StreamError),
}

struct ZipCore<L, R> {
    shared: Mutex<Shared<L, R>>,
    rules: ZipRules<L, R>,
    downstream: OnceLock<Downstream<L, R>>,
    config: ZipConfig,
    diagnostics: DiagnosticContext,
    metrics: ZipMetrics,
}

impl<L, R> ZipCore<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn on_next_left(self: &Arc<Self>, batch: Batch<L>) -> Acknowledgment {
        match Head::from_batch(batch) {
            Some(head) => self.accept(Arrival::Left(head)),
            None => Acknowledgment::CONTINUE,
        }
    }

    fn on_next_right(self: &Arc<Self>, batch: Batch<R>) -> Acknowledgment {
        match Head::from_batch(batch) {
            Some(head) => self.accept(Arrival::Right(head)),
            None => Acknowledgment::CONTINUE,
        }
    }

    fn accept(self: &Arc<Self>, arrival: Arrival<L, R>) -> Acknowledgment {
        let side = arrival.side();
        if self.downstream.get().is_none() {
            warn!(zip = %self.config.name, %side, "batch received before subscription");
            return Acknowledgment::STOP;
        }
        self.metrics.record_batch(side);

        let mut shared = self.shared.lock();
        let measured = measure(&shared.state, &shared.termination);
        trace!(zip = %self.config.name, %side, state = %measured, "batch received");
        if measured == MeasuredState::Stopped || shared.halted.is_some() {
            return Acknowledgment::STOP;
        }

        let previous = std::mem::replace(&mut shared.state, ZipState::Pairing);
        match (previous, arrival) {
            (ZipState::WaitingOnBoth, Arrival::Left(left)) => {
                let ack = AckPromise::new();
                shared.state = ZipState::with_left_waiting(left.buffer(ack.clone()));
                drop(shared);
                debug!(
                    zip = %self.config.name,
                    %side,
                    state = %MeasuredState::waiting_on(side.opposite()),
                    "batch buffered"
                );
                Acknowledgment::Pending(ack)
            }
            (ZipState::WaitingOnBoth, Arrival::Right(right)) => {
                let ack = AckPromise::new();
                shared.state = ZipState::with_right_waiting(right.buffer(ack.clone()));
                drop(shared);
                debug!(
                    zip = %self.config.name,
                    %side,
                    state = %MeasuredState::waiting_on(side.opposite()),
                    "batch buffered"
                );
                Acknowledgment::Pending(ack)
            }
            (ZipState::WaitingOnLeft(right), Arrival::Left(left)) => {
                drop(shared);
                let owed = right.ack;
                let right = Head {
                    value: right.value,
                    cursor: right.cursor,
                };
                self.pair(Side::Left, owed, left, right)
            }
            (ZipState::WaitingOnRight(left), Arrival::Right(right)) => {
                drop(shared);
                let owed = left.ack;
                let left = Head {
                    value: left.value,
                    cursor: left.cursor,
                };
                self.pair(Side::Right, owed, left, right)
            }
            (previous, _) => {
                shared.state = previous;
                self.metrics.record_protocol_violation();
                let cause = StreamError::ProtocolViolation {
                    side,
                    state: measured,
                };
                warn!(
                    zip = %self.config.name,
                    %side,
                    state = %measured,
                    "source pushed without an acknowledgment"
                );
                shared.termination.fail(cause);
                if shared.state.is_pairing() {
                    return Acknowledgment::STOP;
                }
                let teardown = Self::stop_locked(&mut shared);
                drop(shared);
                self.finish(teardown);
                Acknowledgment::STOP
            }
        }
    }

    /// Runs the pairing loop for `caller`'s new batch against the buffered
    /// batch of the other side, whose producer is owed `owed`.
    fn pair(
        self: &Arc<Self>,
        caller: Side,
        owed: AckPromise,
        left: Head<L>,
        right: Head<R>,
    ) -> Acknowledgment {
        let (output, remainder) = self.run_loop(left, right);

        let downstream_ack = if output.is_empty() {
            Acknowledgment::CONTINUE
        } else {
            self.emit(output)
        };

        self.commit(caller, owed, remainder, downstream_ack)
    }

    fn run_loop(&self, left: Head<L>, right: Head<R>) -> (Vec<(L, R)>, Remainder<L, R>) {
        let Head {
            value: mut left_value,
            cursor: mut left_cursor,
        } = left;
        let Head {
            value: mut right_value,
            cursor: mut right_cursor,
        } = right;
        let mut output = Vec::with_capacity(self.config.output_capacity.into_inner());

        loop {
            let (matched, advance_left, advance_right) =
                match self.step(&left_value, &right_value) {
                    Ok(decision) => decision,
                    Err(cause) => return (output, Remainder::Failed(cause)),
                };
            if matched {
                output.push((left_value.clone(), right_value.clone()));
            }

            let mut left_exhausted = false;
            if advance_left {
                match left_cursor.next() {
                    Some(value) => left_value = value,
                    None => left_exhausted = true,
                }
            }
            let mut right_exhausted = false;
            if advance_right {
                match right_cursor.next() {
                    Some(value) => right_value = value,
                    None => right_exhausted = true,
                }
            }

            let remainder = match (left_exhausted, right_exhausted) {
                (false, false) => continue,
                (true, true) => Remainder::Neither,
                (true, false) => Remainder::Right(Head {
                    value: right_value,
                    cursor: right_cursor,
                }),
                (false, true) => Remainder::Left(Head {
                    value: left_value,
                    cursor: left_cursor,
                }),
            };
            return (output, remainder);
        }
    }

    /// Evaluates the three predicates for one pair of current values.
    fn step(&self, left: &L, right: &R) -> Result<(bool, bool, bool), StreamError> {
        let evaluate = |kind: PredicateKind| {
            self.rules.evaluate(kind, left, right).map_err(|cause| {
                self.metrics.record_predicate_failure();
                warn!(zip = %self.config.name, predicate = %kind, %cause, "predicate failed");
                cause
            })
        };

        let matched = evaluate(PredicateKind::Match)?;
        let advance_left = evaluate(PredicateKind::RequestLeft)?;
        let advance_right = evaluate(PredicateKind::RequestRight)?;

        if !advance_left && !advance_right {
            let violation = InvariantViolation {
                kind: ViolationKind::NoProgress,
                zip: self.config.name.to_string(),
                context: self.diagnostics.clone(),
            };
            error!(
                zip = %self.config.name,
                built_at = %self.diagnostics,
                "pairing loop advanced neither side"
            );
            return Err(violation.into());
        }
        Ok((matched, advance_left, advance_right))
    }

    fn emit(&self, output: Vec<(L, R)>) -> Acknowledgment {
        let Some(downstream) = self.downstream.get() else {
            return Acknowledgment::STOP;
        };
        self.metrics.record_emission(output.len());
        debug!(zip = %self.config.name, pairs = output.len(), "emitting matched pairs");
        downstream.on_next(Batch::new(output))
    }

    /// Installs the state that follows a pairing loop and decides which
    /// acknowledgments are chained behind `downstream_ack`.
    fn commit(
        self: &Arc<Self>,
        caller: Side,
        owed: AckPromise,
        remainder: Remainder<L, R>,
        downstream_ack: Acknowledgment,
    ) -> Acknowledgment {
        let mut shared = self.shared.lock();

        let mut fresh = None;
        let mut leftover_ack = |side: Side| {
            if side == caller {
                let ack = AckPromise::new();
                fresh = Some(ack.clone());
                ack
            } else {
                owed.clone()
            }
        };
        let (next, exhausted) = match remainder {
            Remainder::Neither => (ZipState::to_waiting_on_both(), [true, true]),
            Remainder::Left(left) => (
                ZipState::with_left_waiting(left.buffer(leftover_ack(Side::Left))),
                [false, true],
            ),
            Remainder::Right(right) => (
                ZipState::with_right_waiting(right.buffer(leftover_ack(Side::Right))),
                [true, false],
            ),
            Remainder::Failed(cause) => {
                shared.termination.fail(cause);
                (ZipState::Stopped, [true, true])
            }
        };
        shared.state = next;

        let settled = downstream_ack.value();
        if settled == Some(Ack::Stop) && shared.halted.is_none() {
            shared.halted = Some(Halt::DownstreamStopped);
        }
        let measured = measure(&shared.state, &shared.termination);
        if shared.halted.is_some() || measured == MeasuredState::Stopped {
            let mut teardown = Self::stop_locked(&mut shared);
            drop(shared);
            teardown.release.push(owed);
            teardown.release.extend(fresh);
            self.finish(teardown);
            return Acknowledgment::STOP;
        }

        let [left_exhausted, right_exhausted] = exhausted;
        let exhausted_on = |side: Side| match side {
            Side::Left => left_exhausted,
            Side::Right => right_exhausted,
        };
        let caller_exhausted = exhausted_on(caller);
        let other_exhausted = exhausted_on(caller.opposite());

        let downstream_pending = settled.is_none();
        let caller_ack = if caller_exhausted && downstream_pending {
            Some(AckPromise::new())
        } else {
            None
        };
        if downstream_pending {
            shared.chained.retain(|ack| !ack.is_resolved());
            shared.chained.extend(caller_ack.iter().cloned());
            if other_exhausted {
                shared.chained.push(owed.clone());
            }
        }
        drop(shared);
        debug!(zip = %self.config.name, state = %measured, "pairing committed");

        if downstream_pending {
            let core = Arc::clone(self);
            downstream_ack.on_complete(move |ack| {
                if ack.is_stop() {
                    core.halt(Halt::DownstreamStopped);
                }
            });
        }
        if other_exhausted {
            if downstream_pending {
                self.metrics.record_chained_ack();
            }
            downstream_ack.link_to(&owed);
        }

        if caller_exhausted {
            match caller_ack {
                Some(ack) => {
                    self.metrics.record_chained_ack();
                    downstream_ack.link_to(&ack);
                    Acknowledgment::Pending(ack)
                }
                None => downstream_ack,
            }
        } else {
            fresh.map_or(Acknowledgment::STOP, Acknowledgment::Pending)
        }
    }

    fn complete(&self, side: Side) {
        let teardown = {
            let mut shared = self.shared.lock();
            if shared.state.is_stopped() || !shared.termination.complete(side) {
                return;
            }
            let measured = measure(&shared.state, &shared.termination);
            debug!(zip = %self.config.name, %side, state = %measured, "source completed");
            if measured != MeasuredState::Stopped {
                return;
            }
            Self::stop_locked(&mut shared)
        };
        self.finish(teardown);
    }

    fn fail(&self, cause: StreamError) {
        let teardown = {
            let mut shared = self.shared.lock();
            if shared.state.is_stopped() {
                trace!(zip = %self.config.name, %cause, "error after stop ignored");
                return;
            }
            debug!(zip = %self.config.name, %cause, "source failed");
            if !shared.termination.fail(cause) || shared.state.is_pairing() {
                return;
            }
            Self::stop_locked(&mut shared)
        };
        self.finish(teardown);
    }

    fn halt(&self, reason: Halt) {
        let teardown = {
            let mut shared = self.shared.lock();
            if shared.state.is_stopped() {
                return;
            }
            if shared.halted.is_none() {
                shared.halted = Some(reason);
            }
            if shared.state.is_pairing() {
                return;
            }
            Self::stop_locked(&mut shared)
        };
        debug!(zip = %self.config.name, ?reason, "zip halted");
        self.finish(teardown);
    }

    /// Moves to `Stopped` and collects what must happen once the lock is released.
    fn stop_locked(shared: &mut Shared<L, R>) -> Teardown {
        let mut release: Vec<AckPromise> = shared.state.to_stopped().into_iter().collect();
        release.append(&mut shared.chained);

        let signal = if shared.halted.is_some() {
            Signal::Silent
        } else if let Some(cause) = shared.termination.error() {
            Signal::Failed(cause.clone())
        } else {
            Signal::Completed
        };
        Teardown { signal, release }
    }

    fn finish(&self, teardown: Teardown) {
        if let Some(downstream) = self.downstream.get() {
            match teardown.signal {
                Signal::Completed => {
                    debug!(zip = %self.config.name, "zip completed");
                    downstream.on_completed();
                }
                Signal::Failed(cause) => {
                    debug!(zip = %self.config.name, %cause, "zip failed");
                    downstream.on_error(cause);
                }
                Signal::Silent => {}
            }
        }
        for ack in teardown.release {
            ack.try_resolve(Ack::Stop);
        }
    }

    fn status(&self) -> ZipStatus {
        let shared = self.shared.lock();
        let (left_buffered, right_buffered) = shared.state.buffered();
        ZipStatus {
            state: measure(&shared.state, &shared.termination),
            termination: shared.termination.kind(),
            left_buffered,
            right_buffered,
        }
    }
}

struct LeftObserver<L, R> {
    core: Arc<ZipCore<L, R>>,
}

impl<L, R> Observer<L> for LeftObserver<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn on_next(&self, batch: Batch<L>) -> Acknowledgment {
        self.core.on_next_left(batch)
    }

    fn on_error(&self, cause: StreamError) {
        trace!(zip = %self.core.config.name, side = %Side::Left, "error signalled");
        self.core.fail(cause);
    }

    fn on_completed(&self) {
        self.core.complete(Side::Left);
    }
}

struct RightObserver<L, R> {
    core: Arc<ZipCore<L, R>>,
}

impl<L, R> Observer<R> for RightObserver<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn on_next(&self, batch: Batch<R>) -> Acknowledgment {
        self.core.on_next_right(batch)
    }

    fn on_error(&self, cause: StreamError) {
        trace!(zip = %self.core.config.name, side = %Side::Right, "error signalled");
        self.core.fail(cause);
    }

    fn on_completed(&self) {
        self.core.complete(Side::Right);
    }
}

/// Zips a left and a right push-based source into matched pairs.
///
/// # Example
///
/// ```rust,ignore
/// use zipcore::prelude::*;
///
/// let zip = ControlledZip::builder(left, right, scheduler)
///     .rules(ZipRules::sorted_join())
///     .build();
/// let subscription = zip.observe(downstream)?;
/// ```
pub struct ControlledZip<L, R> {
    core: Arc<ZipCore<L, R>>,
    left: Arc<dyn Observable<L>>,
    right: Arc<dyn Observable<R>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<L, R> ControlledZip<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Starts building a combinator over `left` and `right`.
    ///
    /// `scheduler` is handed to both sources when they are subscribed.
    pub fn builder(
        left: Arc<dyn Observable<L>>,
        right: Arc<dyn Observable<R>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> ControlledZipBuilder<L, R> {
        ControlledZipBuilder {
            left,
            right,
            scheduler,
            rules: ZipRules::lockstep(),
            config: ZipConfig::default(),
            diagnostics: None,
        }
    }

    /// Subscribes `downstream`, then both sources, each exactly once.
    ///
    /// Cancelling the returned handle unsubscribes both sources and releases
    /// every pending acknowledgment with [`Ack::Stop`].
    #[instrument(skip_all, fields(zip = %self.core.config.name))]
    pub fn observe(&self, downstream: Downstream<L, R>) -> StreamResult<Cancelable> {
        self.observe_on(downstream, Arc::clone(&self.scheduler))
    }

    fn observe_on(
        &self,
        downstream: Downstream<L, R>,
        scheduler: Arc<dyn Scheduler>,
    ) -> StreamResult<Cancelable> {
        if self.core.downstream.set(downstream).is_err() {
            warn!(zip = %self.core.config.name, "observe called twice");
            return Err(StreamError::AlreadySubscribed);
        }
        debug!(zip = %self.core.config.name, "subscribing to sources");

        let left = self.left.subscribe(
            Arc::new(LeftObserver {
                core: Arc::clone(&self.core),
            }),
            Arc::clone(&scheduler),
        );
        let right = self.right.subscribe(
            Arc::new(RightObserver {
                core: Arc::clone(&self.core),
            }),
            scheduler,
        );
        let core = Arc::clone(&self.core);
        let halt = Cancelable::new(move || core.halt(Halt::Canceled));

        Ok(Cancelable::composite([left, right, halt]))
    }

    /// Delivers a left batch directly, as the left source would.
    pub fn on_next_left(&self, batch: Batch<L>) -> Acknowledgment {
        self.core.on_next_left(batch)
    }

    /// Delivers a right batch directly, as the right source would.
    pub fn on_next_right(&self, batch: Batch<R>) -> Acknowledgment {
        self.core.on_next_right(batch)
    }

    /// Signals that the left source completed.
    pub fn on_completed_left(&self) {
        self.core.complete(Side::Left);
    }

    /// Signals that the right source completed.
    pub fn on_completed_right(&self) {
        self.core.complete(Side::Right);
    }

    /// Signals that a source failed.
    pub fn on_error(&self, cause: StreamError) {
        self.core.fail(cause);
    }

    /// Snapshot of the current state.
    pub fn status(&self) -> ZipStatus {
        self.core.status()
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// The configuration this instance was built with.
    pub fn config(&self) -> &ZipConfig {
        &self.core.config
    }
}

impl<L, R> Observable<(L, R)> for ControlledZip<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn subscribe(
        &self,
        observer: Arc<dyn Observer<(L, R)>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Cancelable {
        match self.observe_on(Arc::clone(&observer), scheduler) {
            Ok(cancelable) => cancelable,
            Err(cause) => {
                observer.on_error(cause);
                Cancelable::empty()
            }
        }
    }
}

impl<L, R> fmt::Debug for ControlledZip<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlledZip")
            .field("name", &self.core.config.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ControlledZip`].
pub struct ControlledZipBuilder<L, R> {
    left: Arc<dyn Observable<L>>,
    right: Arc<dyn Observable<R>>,
    scheduler: Arc<dyn Scheduler>,
    rules: ZipRules<L, R>,
    config: ZipConfig,
    diagnostics: Option<DiagnosticContext>,
}

impl<L, R> ControlledZipBuilder<L, R>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Sets the predicates. Defaults to [`ZipRules::lockstep`].
    #[must_use]
    pub fn rules(mut self, rules: ZipRules<L, R>) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ZipConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a caller-supplied diagnostic context to internal errors.
    ///
    /// Without one, the context is captured where [`Self::build`] is called.
    #[must_use]
    pub fn diagnostics(mut self, diagnostics: DiagnosticContext) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Builds the combinator in `WaitingOnBoth` / `Active`.
    #[track_caller]
    pub fn build(self) -> ControlledZip<L, R> {
        let diagnostics = match self.diagnostics {
            Some(diagnostics) => diagnostics,
            None => DiagnosticContext::capture(self.config.capture_backtrace),
        };

        ControlledZip {
            core: Arc::new(ZipCore {
                shared: Mutex::new(Shared {
                    state: ZipState::to_waiting_on_both(),
                    termination: TerminationState::Active,
                    halted: None,
                    chained: Vec::new(),
                }),
                rules: self.rules,
                downstream: OnceLock::new(),
                config: self.config,
                diagnostics,
                metrics: ZipMetrics::new(),
            }),
            left: self.left,
            right: self.right,
            scheduler: self.scheduler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Task;
    use crate::testing::prelude::*;
    use std::thread;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Inline;

    impl Scheduler for Inline {
        fn execute(&self, task: Task) {
            task();
        }
    }

    type Sources = (Arc<ManualSource<u32>>, Arc<ManualSource<u32>>);

    fn zip_over(rules: ZipRules<u32, u32>) -> (ControlledZip<u32, u32>, Sources) {
        let left = Arc::new(ManualSource::<u32>::new());
        let right = Arc::new(ManualSource::<u32>::new());
        let zip = ControlledZip::<u32, u32>::builder(left.clone(), right.clone(), Arc::new(Inline))
            .rules(rules)
            .build();
        (zip, (left, right))
    }

    #[test]
    #[traced_test]
    fn test_protocol_violation_is_logged() {
        let (zip, (left, _right)) = zip_over(ZipRules::lockstep());
        let downstream = Arc::new(RecordingObserver::<(u32, u32)>::new());
        let _subscription = zip.observe(downstream.clone()).unwrap();

        let _first = left.push(vec![1]);
        let _second = left.push(vec![2]);

        assert!(logs_contain("source pushed without an acknowledgment"));
        assert!(logs_contain("zip failed"));
    }

    #[test]
    #[traced_test]
    fn test_emission_is_logged_with_pair_count() {
        let (zip, (left, right)) = zip_over(ZipRules::lockstep());
        let downstream = Arc::new(RecordingObserver::<(u32, u32)>::new());
        let _subscription = zip.observe(downstream.clone()).unwrap();

        let _left = left.push(vec![1, 2]);
        let _right = right.push(vec![3, 4]);

        assert!(logs_contain("emitting matched pairs"));
        assert!(logs_contain("pairs=2"));
    }

    #[test]
    fn test_custom_diagnostics_are_reported() {
        let context = DiagnosticContext::capture(false);
        let line = context.location().line();
        let left = Arc::new(ManualSource::<u32>::new());
        let right = Arc::new(ManualSource::<u32>::new());
        let stuck = ZipRules::infallible(|_, _| false, |_, _| false, |_, _| false);
        let zip = ControlledZip::<u32, u32>::builder(left.clone(), right.clone(), Arc::new(Inline))
            .rules(stuck)
            .diagnostics(context)
            .build();
        let downstream = Arc::new(RecordingObserver::<(u32, u32)>::new());
        let _subscription = zip.observe(downstream.clone()).unwrap();

        let _left = left.push(vec![1]);
        let _right = right.push(vec![1]);

        match assert_failed_once(&downstream) {
            StreamError::Internal(violation) => {
                assert_eq!(violation.kind, ViolationKind::NoProgress);
                assert_eq!(violation.zip, "controlled-zip");
                assert_eq!(violation.context.location().line(), line);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_threaded_producers_deliver_every_pair_in_order() {
        let (zip, (left, right)) = zip_over(ZipRules::lockstep());
        let downstream = Arc::new(RecordingObserver::<(u32, u32)>::new());
        let _subscription = zip.observe(downstream.clone()).unwrap();

        let produce = |source: Arc<ManualSource<u32>>, offset: u32| {
            thread::spawn(move || {
                for chunk in (0..50u32).collect::<Vec<_>>().chunks(7) {
                    let ack = source.push(chunk.iter().map(|v| v + offset).collect());
                    let (tx, rx) = std::sync::mpsc::channel();
                    ack.on_complete(move |ack| {
                        let _ = tx.send(ack);
                    });
                    if rx.recv().unwrap().is_stop() {
                        return;
                    }
                }
                source.complete();
            })
        };

        let left_thread = produce(left, 0);
        let right_thread = produce(right, 1000);
        left_thread.join().unwrap();
        right_thread.join().unwrap();

        let expected: Vec<(u32, u32)> = (0..50).map(|v| (v, v + 1000)).collect();
        assert_pairs(&downstream, &expected);
        assert_completed_once(&downstream);
        assert_eq!(zip.metrics().pairs_emitted, 50);
    }

    #[test]
    fn test_debug_shows_name_and_status() {
        let (zip, _sources) = zip_over(ZipRules::lockstep());
        let rendered = format!("{zip:?}");
        assert!(rendered.contains("controlled-zip"));
        assert!(rendered.contains("WaitingOnBoth"));
    }
}
