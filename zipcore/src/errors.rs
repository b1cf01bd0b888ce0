//! Error types for zipcore.
//!
//! Every terminal failure of a zipped stream is a [`StreamError`]. The
//! variants separate failures that originate outside the combinator (a source
//! failing, a user predicate failing) from failures of the combinator itself:
//!
//! - **Upstream**: a source signalled `on_error`; the cause is forwarded as is
//! - **Predicate** / **PredicatePanicked**: a user predicate failed
//! - **ProtocolViolation**: a source pushed while its previous batch was unacknowledged
//! - **Internal**: an internal invariant broke; see [`InvariantViolation`]
//! - **AlreadySubscribed**: `observe` was called twice on the same combinator
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use zipcore::errors::StreamError;
//!
//! fn on_error(&self, cause: StreamError) {
//!     if cause.is_internal() {
//!         // A bug in the combinator, not in the data.
//!         tracing::error!(%cause, "zip failed internally");
//!     }
//! }
//! ```

use crate::state::{MeasuredState, Side};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by fallible user predicates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared, cloneable error cause.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for zipcore operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Which user predicate was being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    /// The function deciding whether a pair is emitted.
    Match,
    /// The function deciding whether the left cursor advances.
    RequestLeft,
    /// The function deciding whether the right cursor advances.
    RequestRight,
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => f.write_str("match"),
            Self::RequestLeft => f.write_str("request_left"),
            Self::RequestRight => f.write_str("request_right"),
        }
    }
}

/// Terminal error of a zipped stream.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A source signalled an error.
    #[error("upstream failed: {0}")]
    Upstream(#[source] SharedError),

    /// A user predicate returned an error.
    #[error("predicate `{predicate}` failed: {source}")]
    Predicate {
        /// The predicate that failed.
        predicate: PredicateKind,
        /// The error it returned.
        #[source]
        source: SharedError,
    },

    /// A user predicate panicked.
    #[error("predicate `{predicate}` panicked: {message}")]
    PredicatePanicked {
        /// The predicate that panicked.
        predicate: PredicateKind,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// A source pushed a batch it was not allowed to push.
    #[error("{side} source violated back-pressure while zip was {state}")]
    ProtocolViolation {
        /// The offending source.
        side: Side,
        /// The measured state when the batch arrived.
        state: MeasuredState,
    },

    /// The combinator broke one of its own invariants.
    #[error(transparent)]
    Internal(#[from] InvariantViolation),

    /// `observe` was called more than once.
    #[error("controlled zip was already subscribed")]
    AlreadySubscribed,
}

impl StreamError {
    /// Wraps a source's own error.
    pub fn upstream<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream(Arc::new(error))
    }

    /// Builds an upstream error from a plain message.
    pub fn upstream_message(message: impl Into<String>) -> Self {
        Self::upstream(MessageError(message.into()))
    }

    /// Returns `true` for internal invariant violations.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Returns `true` for errors signalled by a source.
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    /// Returns `true` for errors raised by user predicates.
    pub const fn is_predicate(&self) -> bool {
        matches!(
            self,
            Self::Predicate { .. } | Self::PredicatePanicked { .. }
        )
    }
}

/// Plain-text error for sources that fail without a richer type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MessageError(pub String);

/// The invariant that was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViolationKind {
    /// Neither `request_left` nor `request_right` asked for an advance.
    #[error("pairing loop advanced neither side")]
    NoProgress,
}

/// A fatal internal error, never retried and never swallowed.
#[derive(Debug, Clone, Error)]
#[error("{kind} in zip `{zip}` (built at {context})")]
pub struct InvariantViolation {
    /// What went wrong.
    pub kind: ViolationKind,
    /// Name of the combinator instance.
    pub zip: String,
    /// Where the combinator was built.
    pub context: DiagnosticContext,
}

/// Call-site trace attached to internal errors.
#[derive(Debug, Clone)]
pub struct DiagnosticContext {
    location: &'static Location<'static>,
    backtrace: Option<Arc<Backtrace>>,
}

impl DiagnosticContext {
    /// Records the caller's location, and a backtrace if asked to.
    #[track_caller]
    pub fn capture(with_backtrace: bool) -> Self {
        Self {
            location: Location::caller(),
            backtrace: with_backtrace.then(|| Arc::new(Backtrace::force_capture())),
        }
    }

    /// Source location the context was captured at.
    pub const fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Backtrace captured with the context, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace
            .as_deref()
            .filter(|bt| bt.status() == BacktraceStatus::Captured)
    }
}

impl fmt::Display for DiagnosticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.location.file(),
            self.location.line(),
            self.location.column()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_upstream_error_keeps_source() {
        let error = StreamError::upstream_message("disk on fire");
        assert!(error.is_upstream());
        assert!(!error.is_internal());
        assert_eq!(error.to_string(), "upstream failed: disk on fire");
        assert_eq!(error.source().unwrap().to_string(), "disk on fire");
    }

    #[test]
    fn test_internal_error_is_distinguishable() {
        let error = StreamError::from(InvariantViolation {
            kind: ViolationKind::NoProgress,
            zip: "orders".to_string(),
            context: DiagnosticContext::capture(false),
        });

        assert!(error.is_internal());
        assert!(!error.is_predicate());
        let rendered = error.to_string();
        assert!(rendered.starts_with("pairing loop advanced neither side in zip `orders`"));
        assert!(rendered.contains("errors.rs"));
    }

    #[test]
    fn test_diagnostic_context_records_caller() {
        let context = DiagnosticContext::capture(false);
        assert!(context.location().file().ends_with("errors.rs"));
        assert!(context.backtrace().is_none());
    }

    #[test]
    fn test_predicate_error_display() {
        let error = StreamError::Predicate {
            predicate: PredicateKind::RequestRight,
            source: Arc::new(MessageError("bad key".to_string())),
        };
        assert!(error.is_predicate());
        assert_eq!(
            error.to_string(),
            "predicate `request_right` failed: bad key"
        );
    }

    #[test]
    fn test_protocol_violation_display() {
        let error = StreamError::ProtocolViolation {
            side: Side::Left,
            state: MeasuredState::WaitingOnRight,
        };
        assert_eq!(
            error.to_string(),
            "left source violated back-pressure while zip was waiting on right"
        );
    }
}
