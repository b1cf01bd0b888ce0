//! Zip and termination state machines.
//!
//! [`ZipState`] records which side, if any, holds the unmatched remainder of
//! its latest batch. [`TerminationState`] records which sources have
//! completed or failed. Neither decides anything on its own: the orchestrator
//! combines them through [`measure`] and drives every transition while
//! holding its lock.

use crate::ack::AckPromise;
use crate::batch::Cursor;
use crate::errors::StreamError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two zipped sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The first source.
    Left,
    /// The second source.
    Right,
}

impl Side {
    /// The other source.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// Externally meaningful state, derived from zip and termination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasuredState {
    /// Nothing buffered; either side may deliver.
    WaitingOnBoth,
    /// Right elements are buffered; the left source must deliver next.
    WaitingOnLeft,
    /// Left elements are buffered; the right source must deliver next.
    WaitingOnRight,
    /// A pairing loop currently owns both cursors.
    Pairing,
    /// No further matching will happen.
    Stopped,
}

impl MeasuredState {
    /// The measured state in which `side` is the one expected to deliver.
    pub const fn waiting_on(side: Side) -> Self {
        match side {
            Side::Left => Self::WaitingOnLeft,
            Side::Right => Self::WaitingOnRight,
        }
    }
}

impl fmt::Display for MeasuredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingOnBoth => f.write_str("waiting on both"),
            Self::WaitingOnLeft => f.write_str("waiting on left"),
            Self::WaitingOnRight => f.write_str("waiting on right"),
            Self::Pairing => f.write_str("pairing"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Payload-free view of [`TerminationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationKind {
    /// Neither source has terminated.
    Active,
    /// The left source completed.
    LeftCompleted,
    /// The right source completed.
    RightCompleted,
    /// Both sources completed.
    BothCompleted,
    /// A source or predicate failed.
    Errored,
}

/// The unmatched remainder of one side's batch.
#[derive(Debug)]
pub(crate) struct Buffered<T> {
    pub(crate) value: T,
    pub(crate) cursor: Cursor<T>,
    /// Owed back to this side's producer once the batch is used up.
    pub(crate) ack: AckPromise,
}

impl<T> Buffered<T> {
    /// Elements still held, including the current value.
    pub(crate) fn len(&self) -> usize {
        1 + self.cursor.remaining()
    }
}

/// Raw zip state. Exactly one variant holds at any instant.
#[derive(Debug)]
pub(crate) enum ZipState<L, R> {
    WaitingOnBoth,
    WaitingOnLeft(Buffered<R>),
    WaitingOnRight(Buffered<L>),
    /// Transitional: a pairing loop owns both cursors until it commits.
    Pairing,
    Stopped,
}

impl<L, R> ZipState<L, R> {
    /// Left holds a remainder, so the right source is expected next.
    pub(crate) const fn with_left_waiting(left: Buffered<L>) -> Self {
        Self::WaitingOnRight(left)
    }

    /// Right holds a remainder, so the left source is expected next.
    pub(crate) const fn with_right_waiting(right: Buffered<R>) -> Self {
        Self::WaitingOnLeft(right)
    }

    pub(crate) const fn to_waiting_on_both() -> Self {
        Self::WaitingOnBoth
    }

    /// Moves to `Stopped`, handing back the ack still owed to a buffered side.
    pub(crate) fn to_stopped(&mut self) -> Option<AckPromise> {
        match std::mem::replace(self, Self::Stopped) {
            Self::WaitingOnLeft(right) => Some(right.ack),
            Self::WaitingOnRight(left) => Some(left.ack),
            Self::WaitingOnBoth | Self::Pairing | Self::Stopped => None,
        }
    }

    pub(crate) const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub(crate) const fn is_pairing(&self) -> bool {
        matches!(self, Self::Pairing)
    }

    /// Buffered element counts as `(left, right)`.
    pub(crate) fn buffered(&self) -> (usize, usize) {
        match self {
            Self::WaitingOnLeft(right) => (0, right.len()),
            Self::WaitingOnRight(left) => (left.len(), 0),
            Self::WaitingOnBoth | Self::Pairing | Self::Stopped => (0, 0),
        }
    }
}

/// Completion and failure status of the two sources.
#[derive(Debug, Clone)]
pub(crate) enum TerminationState {
    Active,
    LeftCompleted,
    RightCompleted,
    BothCompleted,
    Errored(StreamError),
}

impl TerminationState {
    /// Records a completion. Returns `false` when nothing changed.
    pub(crate) fn complete(&mut self, side: Side) -> bool {
        let next = match (&*self, side) {
            (Self::Active, Side::Left) => Self::LeftCompleted,
            (Self::Active, Side::Right) => Self::RightCompleted,
            (Self::LeftCompleted, Side::Right) | (Self::RightCompleted, Side::Left) => {
                Self::BothCompleted
            }
            _ => return false,
        };
        *self = next;
        true
    }

    /// Records a failure. Only the first failure is kept.
    pub(crate) fn fail(&mut self, cause: StreamError) -> bool {
        if let Self::Errored(_) = self {
            return false;
        }
        *self = Self::Errored(cause);
        true
    }

    pub(crate) const fn kind(&self) -> TerminationKind {
        match self {
            Self::Active => TerminationKind::Active,
            Self::LeftCompleted => TerminationKind::LeftCompleted,
            Self::RightCompleted => TerminationKind::RightCompleted,
            Self::BothCompleted => TerminationKind::BothCompleted,
            Self::Errored(_) => TerminationKind::Errored,
        }
    }

    pub(crate) const fn has_completed(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (Self::LeftCompleted, Side::Left)
                | (Self::RightCompleted, Side::Right)
                | (Self::BothCompleted, _)
        )
    }

    pub(crate) const fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Errored(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Derives the measured state.
///
/// A completed side can no longer deliver, so any state that waits on it is
/// `Stopped`. `Pairing` defers every decision to the running loop's commit.
pub(crate) const fn measure<L, R>(
    raw: &ZipState<L, R>,
    termination: &TerminationState,
) -> MeasuredState {
    match raw {
        ZipState::Stopped => MeasuredState::Stopped,
        ZipState::Pairing => MeasuredState::Pairing,
        _ if termination.error().is_some() => MeasuredState::Stopped,
        ZipState::WaitingOnBoth => match termination {
            TerminationState::Active => MeasuredState::WaitingOnBoth,
            _ => MeasuredState::Stopped,
        },
        ZipState::WaitingOnLeft(_) if termination.has_completed(Side::Left) => {
            MeasuredState::Stopped
        }
        ZipState::WaitingOnLeft(_) => MeasuredState::WaitingOnLeft,
        ZipState::WaitingOnRight(_) if termination.has_completed(Side::Right) => {
            MeasuredState::Stopped
        }
        ZipState::WaitingOnRight(_) => MeasuredState::WaitingOnRight,
    }
}
