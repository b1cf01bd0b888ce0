//! Example pipelines using the `zipcore` controlled zip
//!
//! This crate holds the domain code behind the runnable examples, so it can
//! be unit tested apart from the binaries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Order fills: a one-to-many merge join of orders and their executions.
pub mod fills;
