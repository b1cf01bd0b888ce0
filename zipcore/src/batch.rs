//! Batches and the forward-only cursors that consume them.

use std::vec;

/// An ordered, finite chunk of elements delivered by one `on_next` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch<T> {
    items: Vec<T>,
}

impl<T> Batch<T> {
    /// Wraps the given elements.
    pub const fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Number of elements in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the batch carries no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrows the elements in delivery order.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Unwraps the elements.
    pub fn into_inner(self) -> Vec<T> {
        self.items
    }

    /// Consumes the batch into a forward-only cursor.
    pub fn into_cursor(self) -> Cursor<T> {
        Cursor {
            inner: self.items.into_iter(),
        }
    }
}

impl<T> From<Vec<T>> for Batch<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T> FromIterator<T> for Batch<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = Cursor<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_cursor()
    }
}

/// Forward-only cursor over the remainder of a batch.
///
/// Once advanced past, an element cannot be replayed.
#[derive(Debug)]
pub struct Cursor<T> {
    inner: vec::IntoIter<T>,
}

impl<T> Cursor<T> {
    /// Number of elements not yet pulled.
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl<T> Iterator for Cursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Cursor<T> {}
