//! zipcore Benchmarks
//!
//! Criterion benchmarks for the controlled zip, plus the input generators
//! they share.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use zipcore::testing::prelude::*;
use zipcore::{ControlledZip, Scheduler, ZipRules};
use zipcore_memory::IterSource;

/// Ascending values below `bound`, each kept with probability `density`.
///
/// The same `seed` always yields the same sequence.
pub fn sorted_values(seed: u64, bound: u64, density: f64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..bound).filter(|_| rng.random_bool(density)).collect()
}

/// Cuts `values` into batches of random length between 1 and `max_batch`.
pub fn random_batches(seed: u64, values: Vec<u64>, max_batch: usize) -> Vec<Vec<u64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut batches = Vec::new();
    let mut rest = values.as_slice();
    while !rest.is_empty() {
        let len = rng.random_range(1..=max_batch.max(1)).min(rest.len());
        let (head, tail) = rest.split_at(len);
        batches.push(head.to_vec());
        rest = tail;
    }
    batches
}

/// Runs one zip over the given batches to completion and returns the number
/// of pairs delivered.
pub fn run_zip(
    left: Vec<Vec<u64>>,
    right: Vec<Vec<u64>>,
    rules: ZipRules<u64, u64>,
    scheduler: Arc<dyn Scheduler>,
) -> usize {
    let zip = ControlledZip::<u64, u64>::builder(
        Arc::new(IterSource::new(left)),
        Arc::new(IterSource::new(right)),
        scheduler,
    )
    .rules(rules)
    .build();
    let downstream = Arc::new(RecordingObserver::<(u64, u64)>::new());
    match zip.observe(downstream.clone()) {
        Ok(_subscription) => downstream.items().len(),
        Err(_) => 0,
    }
}
