//! Property test generators for streams fed into a controlled zip.

use super::recorder::AckScript;
use proptest::prelude::*;
use std::fmt::Debug;

/// Generates strictly ascending sequences of up to `max_len` values below 200.
pub fn arb_sorted_unique(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    prop::collection::btree_set(0u32..200, 0..=max_len).prop_map(|set| set.into_iter().collect())
}

/// Splits `items` into non-empty batches at random cut points, keeping order.
pub fn arb_split<T>(items: Vec<T>) -> impl Strategy<Value = Vec<Vec<T>>>
where
    T: Clone + Debug + 'static,
{
    let cuts = prop::collection::vec(any::<bool>(), items.len());
    (Just(items), cuts).prop_map(|(items, cuts)| split_at_cuts(items, &cuts))
}

/// Generates ascending values already split into batches.
pub fn arb_sorted_batches(max_len: usize) -> impl Strategy<Value = Vec<Vec<u32>>> {
    arb_sorted_unique(max_len).prop_flat_map(arb_split)
}

/// Generates acknowledgment scripts a well-behaved downstream may follow.
pub fn arb_ack_script() -> impl Strategy<Value = AckScript> {
    prop_oneof![Just(AckScript::Continue), Just(AckScript::Pending)]
}

/// Cuts after every element whose flag is set.
pub fn split_at_cuts<T>(items: Vec<T>, cuts: &[bool]) -> Vec<Vec<T>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    for (item, cut) in items.into_iter().zip(cuts.iter().copied()) {
        current.push(item);
        if cut {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
