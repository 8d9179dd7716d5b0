//! Lock-free hash table engines over device words.
//!
//! The engines in this module operate on plain slices of `AtomicU64`, the same
//! words a kernel sees when a dispatch binds a device buffer. They do not own
//! memory and never block: every mutation is a single compare-and-swap (CAS)
//! on one word, and an invocation that loses a CAS re-reads the word and keeps
//! going forward instead of treating the loss as an error.
//!
//! A key slot holds one of three things: `0` (empty), a live key, or a
//! tombstone, which is the deleted key with `TOMBSTONE_TAG` set. Removing a key
//! turns its slot into its tombstone instead of emptying it, and inserting a
//! key can only replace a tombstone of that same key. Once a slot has been
//! claimed for a key it will only ever hold that key or its tombstone, and
//! slots never go back to empty. Because every insert of a key visits slots in
//! the same order and claims the first empty slot it meets, all slots before a
//! key's slot on its path stay occupied forever, so a later insert of the same
//! key always reaches the existing slot first. This is what keeps a key from
//! being stored twice even when deletes and inserts of the same key race.
//!
//! The same slot protocol is used by both engines:
//!
//! - [`LinearProbing`] probes a flat array of slots, starting at
//!   `hash mod capacity` and wrapping around.
//! - [`SlabList`] hashes to a bucket and walks a chain of fixed-size slabs,
//!   growing the chain by CAS-ing a freshly allocated slab into the last slab's
//!   next pointer. Slabs come from a [`SlabAllocator`].
//!
//! Tombstones are not carried over by a resize: the migration pass only
//! re-inserts live keys.
//!
//! [`LinearProbing`]: ./linear_probing/struct.LinearProbing.html
//! [`SlabList`]: ./slab_list/struct.SlabList.html
//! [`SlabAllocator`]: ./allocator/struct.SlabAllocator.html

pub mod allocator;
pub mod layout;
pub mod linear_probing;
pub mod slab_list;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::constants::{EMPTY, TOMBSTONE_TAG};

/// A table key. `0` is reserved for empty slots.
pub type Key = u64;

/// Returns `true` if `key` can be stored in a table.
#[inline]
pub fn is_valid_key(key: Key) -> bool {
    key != EMPTY && key & TOMBSTONE_TAG == 0
}

/// The outcome of one insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was stored in a previously empty slot.
    Inserted { slot: usize },
    /// The key had been deleted from this slot and is live again.
    Revived { slot: usize },
    /// The key is already live in this slot. Nothing changed.
    AlreadyPresent { slot: usize },
    /// No slot (or no slab) was available for the key.
    Exhausted,
}

impl InsertOutcome {
    /// Returns `true` if the key became live because of this insert.
    pub fn is_insertion(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Revived { .. })
    }
}

/// The outcome of one delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { slot: usize },
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    Empty,
    Live(Key),
    Removed(Key),
}

#[inline]
pub(crate) fn slot_state(word: u64) -> SlotState {
    if word == EMPTY {
        SlotState::Empty
    } else if word & TOMBSTONE_TAG != 0 {
        SlotState::Removed(word & !TOMBSTONE_TAG)
    } else {
        SlotState::Live(word)
    }
}

/// What an invocation should do after examining one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotStep<T> {
    /// Stop with this result.
    Done(T),
    /// The slot belongs to another key; move on to the next one.
    Next,
    /// An empty slot was found. Delete uses this to stop early.
    Vacant,
}

/// Runs the insert protocol on a single slot until it either settles the
/// insert or the slot turns out to belong to another key.
pub(crate) fn try_insert_at(slot: &AtomicU64, index: usize, key: Key) -> SlotStep<InsertOutcome> {
    let mut word = slot.load(Ordering::Acquire);
    loop {
        let (expected, outcome) = match slot_state(word) {
            SlotState::Live(k) if k == key => {
                return SlotStep::Done(InsertOutcome::AlreadyPresent { slot: index })
            }
            SlotState::Empty => (EMPTY, InsertOutcome::Inserted { slot: index }),
            SlotState::Removed(k) if k == key => {
                (key | TOMBSTONE_TAG, InsertOutcome::Revived { slot: index })
            }
            // Different key. Try next slot.
            SlotState::Live(_) | SlotState::Removed(_) => return SlotStep::Next,
        };

        match slot.compare_exchange(expected, key, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return SlotStep::Done(outcome),
            // Lost the race. Look at what the winner left in the slot.
            Err(actual) => word = actual,
        }
    }
}

/// Runs the delete protocol on a single slot.
pub(crate) fn try_delete_at(slot: &AtomicU64, index: usize, key: Key) -> SlotStep<DeleteOutcome> {
    let mut word = slot.load(Ordering::Acquire);
    loop {
        match slot_state(word) {
            SlotState::Empty => return SlotStep::Vacant,
            SlotState::Live(k) if k == key => {
                match slot.compare_exchange(
                    key,
                    key | TOMBSTONE_TAG,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return SlotStep::Done(DeleteOutcome::Deleted { slot: index }),
                    Err(actual) => word = actual,
                }
            }
            // Already removed by someone else.
            SlotState::Removed(k) if k == key => return SlotStep::Done(DeleteOutcome::NotFound),
            SlotState::Live(_) | SlotState::Removed(_) => return SlotStep::Next,
        }
    }
}
