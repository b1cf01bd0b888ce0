//! `zipcore` - controlled zip for push-based streams
//!
//! This library merges two asynchronous, push-based sources into one stream
//! of matched `(left, right)` pairs. Three user predicates decide, for the
//! current element of each side, whether the pair is emitted and which side
//! advances. Producers are throttled through acknowledgments: a source may
//! push its next batch only after the combinator acknowledged the previous
//! one, and the combinator acknowledges only once the downstream has
//! acknowledged the pairs that batch produced.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ack;
pub mod batch;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod observer;
pub mod rules;
pub mod state;
pub mod testing;
pub mod zip;

pub use ack::{Ack, AckPromise, Acknowledgment};
pub use batch::{Batch, Cursor};
pub use config::{OutputCapacity, ZipConfig, ZipName};
pub use errors::{
    BoxError, DiagnosticContext, InvariantViolation, MessageError, PredicateKind, StreamError,
    StreamResult, ViolationKind,
};
pub use metrics::{MetricsSnapshot, ZipMetrics};
pub use observer::{Cancelable, Observable, Observer, Scheduler, Task};
pub use rules::{Predicate, ZipRules};
pub use state::{MeasuredState, Side, TerminationKind};
pub use zip::{ControlledZip, ControlledZipBuilder, ZipStatus};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::ack::{Ack, AckPromise, Acknowledgment};
    pub use crate::batch::Batch;
    pub use crate::config::{OutputCapacity, ZipConfig, ZipName};
    pub use crate::errors::{BoxError, StreamError, StreamResult};
    pub use crate::observer::{Cancelable, Observable, Observer, Scheduler};
    pub use crate::rules::ZipRules;
    pub use crate::state::{MeasuredState, Side, TerminationKind};
    pub use crate::zip::{ControlledZip, ZipStatus};
}
