use std::collections::VecDeque;

use derivative::Derivative;

use crate::error::ContainerError;

/// A ring of `N` slots which delays dropping its items by `N - 1` rotations
///
/// Items are always pushed into the newest slot. Every [`DeferredDeletion::rotate`] hands back
/// the oldest slot and opens a fresh newest one, so an item pushed right before a rotation is
/// returned by the `N`th rotation counting that one.
#[derive(Derivative)]
#[derivative(Debug(bound = "T: std::fmt::Debug"))]
pub struct DeferredDeletion<T> {
    slots: VecDeque<Vec<T>>,
}

impl<T> DeferredDeletion<T> {
    pub fn new(slots: usize) -> Result<Self, ContainerError> {
        if slots == 0 {
            return Err(ContainerError::ZeroSlots);
        }
        Ok(Self {
            slots: (0..slots).map(|_| Vec::new()).collect(),
        })
    }

    /// Number of slots in the ring
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Total amount of items waiting to be released
    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    /// Queue an item into the newest slot
    pub fn push(&mut self, item: T) {
        if let Some(newest) = self.slots.back_mut() {
            newest.push(item);
        }
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        if let Some(newest) = self.slots.back_mut() {
            newest.extend(items);
        }
    }

    /// Pops the oldest slot and pushes a fresh empty one
    pub fn rotate(&mut self) -> Vec<T> {
        let oldest = self.slots.pop_front().unwrap_or_default();
        self.slots.push_back(Vec::new());
        oldest
    }

    /// Drains every slot, oldest first
    pub fn flush(&mut self) -> Vec<T> {
        self.slots.iter_mut().flat_map(std::mem::take).collect()
    }
}
