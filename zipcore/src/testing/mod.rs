//! Testing utilities for code built on `zipcore`.
//!
//! - [`recorder`]: a downstream observer that records what it receives and
//!   answers acknowledgments from a script
//! - [`source`]: a source driven by hand from test code
//! - [`assertions`]: assertions over recorded streams
//! - `generators`: proptest strategies (feature `testing`)
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use zipcore::prelude::*;
//! use zipcore::testing::prelude::*;
//!
//! let left = Arc::new(ManualSource::new());
//! let right = Arc::new(ManualSource::new());
//! let zip = ControlledZip::builder(left.clone(), right.clone(), scheduler).build();
//! let downstream = Arc::new(RecordingObserver::new());
//! let _subscription = zip.observe(downstream.clone())?;
//!
//! left.push(vec![1, 2]);
//! right.push(vec![10, 20]);
//! assert_pairs(&downstream, &[(1, 10), (2, 20)]);
//! ```

pub mod assertions;
#[cfg(feature = "testing")]
pub mod generators;
pub mod recorder;
pub mod source;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::assertions::*;
    #[cfg(feature = "testing")]
    pub use super::generators::*;
    pub use super::recorder::{AckScript, Recorded, RecordingObserver};
    pub use super::source::ManualSource;
}
