//! Counters describing what a controlled zip has done so far.

use crate::state::Side;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Creates a counter at zero.
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Adds one.
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `amount`.
    pub fn increment_by(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Live counters owned by one combinator instance.
#[derive(Debug, Default)]
pub struct ZipMetrics {
    left_batches: Counter,
    right_batches: Counter,
    pairs_emitted: Counter,
    downstream_batches: Counter,
    acks_chained: Counter,
    protocol_violations: Counter,
    predicate_failures: Counter,
}

impl ZipMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_batch(&self, side: Side) {
        match side {
            Side::Left => self.left_batches.increment(),
            Side::Right => self.right_batches.increment(),
        }
    }

    pub(crate) fn record_emission(&self, pairs: usize) {
        self.downstream_batches.increment();
        self.pairs_emitted.increment_by(pairs as u64);
    }

    pub(crate) fn record_chained_ack(&self) {
        self.acks_chained.increment();
    }

    pub(crate) fn record_protocol_violation(&self) {
        self.protocol_violations.increment();
    }

    pub(crate) fn record_predicate_failure(&self) {
        self.predicate_failures.increment();
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            left_batches: self.left_batches.get(),
            right_batches: self.right_batches.get(),
            pairs_emitted: self.pairs_emitted.get(),
            downstream_batches: self.downstream_batches.get(),
            acks_chained: self.acks_chained.get(),
            protocol_violations: self.protocol_violations.get(),
            predicate_failures: self.predicate_failures.get(),
        }
    }
}

/// Copy of [`ZipMetrics`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Non-empty batches received from the left source.
    pub left_batches: u64,
    /// Non-empty batches received from the right source.
    pub right_batches: u64,
    /// Pairs delivered downstream.
    pub pairs_emitted: u64,
    /// `on_next` calls made downstream.
    pub downstream_batches: u64,
    /// Source acknowledgments chained behind a pending downstream acknowledgment.
    pub acks_chained: u64,
    /// Batches rejected for violating back-pressure.
    pub protocol_violations: u64,
    /// Predicate errors and panics.
    pub predicate_failures: u64,
}
