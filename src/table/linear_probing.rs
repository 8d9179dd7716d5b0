//! A flat open-addressing table with linear probing.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    is_valid_key, slot_state, try_delete_at, try_insert_at, DeleteOutcome, InsertOutcome, Key,
    SlotState, SlotStep,
};

/// A view of a linear-probing table stored in `capacity` words.
#[derive(Clone, Copy)]
pub struct LinearProbing<'a> {
    slots: &'a [AtomicU64],
}

impl<'a> LinearProbing<'a> {
    /// # Panics
    ///
    /// Panics if `slots` is empty.
    pub fn new(slots: &'a [AtomicU64]) -> Self {
        assert!(!slots.is_empty(), "a table needs at least one slot");
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts `key`, probing from `hash mod capacity`.
    ///
    /// Examines at most `capacity` slots. Returns `Exhausted` if every one of
    /// them belongs to another key.
    pub fn insert(&self, key: Key, hash: u64) -> InsertOutcome {
        debug_assert!(is_valid_key(key));

        for (i, slot) in self.probe(hash) {
            match try_insert_at(slot, i, key) {
                SlotStep::Done(outcome) => return outcome,
                SlotStep::Next | SlotStep::Vacant => continue,
            }
        }

        InsertOutcome::Exhausted
    }

    /// Deletes `key`, probing from `hash mod capacity`.
    ///
    /// Stops at the first empty slot: an insert of `key` would have claimed it,
    /// so `key` cannot be stored further along.
    pub fn delete(&self, key: Key, hash: u64) -> DeleteOutcome {
        debug_assert!(is_valid_key(key));

        for (i, slot) in self.probe(hash) {
            match try_delete_at(slot, i, key) {
                SlotStep::Done(outcome) => return outcome,
                SlotStep::Vacant => break,
                SlotStep::Next => continue,
            }
        }

        DeleteOutcome::NotFound
    }

    pub fn contains(&self, key: Key, hash: u64) -> bool {
        for (_, slot) in self.probe(hash) {
            match slot_state(slot.load(Ordering::Acquire)) {
                SlotState::Empty => return false,
                SlotState::Live(k) if k == key => return true,
                SlotState::Removed(k) if k == key => return false,
                _ => continue,
            }
        }
        false
    }

    /// Returns every live key in slot order.
    pub fn live_keys(&self) -> Vec<Key> {
        self.slots
            .iter()
            .filter_map(|slot| match slot_state(slot.load(Ordering::Acquire)) {
                SlotState::Live(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of slots that are no longer empty, tombstones
    /// included.
    pub fn claimed_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot_state(slot.load(Ordering::Acquire)) != SlotState::Empty)
            .count()
    }

    fn probe(&self, hash: u64) -> Probe<'a> {
        let capacity = self.slots.len();
        Probe {
            slots: self.slots,
            offset: (hash % capacity as u64) as usize,
            i: 0,
        }
    }
}

/// Visits every slot once, starting at `offset` and wrapping around.
struct Probe<'a> {
    slots: &'a [AtomicU64],
    offset: usize,
    i: usize,
}

impl<'a> Iterator for Probe<'a> {
    type Item = (usize, &'a AtomicU64);

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.slots.len();
        if self.i >= len {
            return None;
        }
        let index = (self.offset + self.i) % len;
        self.i += 1;
        Some((index, &self.slots[index]))
    }
}
