//! A separately chained table whose chains are lists of fixed-size slabs.
//!
//! Each bucket word holds the index of the first slab of its chain. A slab is
//! `slab_size` consecutive words of the block region: `slab_size - 1` key
//! slots followed by the index of the next slab. Chains only grow at the tail,
//! and only once the tail slab is full, so every empty key slot of a chain is
//! in its last slab.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    allocator::{SlabAllocator, SlabIndex},
    is_valid_key, slot_state, try_delete_at, try_insert_at, DeleteOutcome, InsertOutcome, Key,
    SlotState, SlotStep,
};
use crate::common::constants::NULL_SLAB;

/// A view of a slab-list table: the bucket array, the block region and its
/// allocator.
#[derive(Clone, Copy)]
pub struct SlabList<'a> {
    buckets: &'a [AtomicU64],
    blocks: &'a [AtomicU64],
    allocator: SlabAllocator<'a>,
    slab_size: usize,
    reclaim_counter: Option<&'a AtomicU64>,
}

impl<'a> SlabList<'a> {
    /// # Panics
    ///
    /// Panics if there are no buckets, `slab_size` is less than 2, or the block
    /// region is smaller than the allocator believes.
    pub fn new(
        buckets: &'a [AtomicU64],
        blocks: &'a [AtomicU64],
        allocator: SlabAllocator<'a>,
        slab_size: usize,
    ) -> Self {
        assert!(!buckets.is_empty(), "a table needs at least one bucket");
        assert!(slab_size >= 2);
        assert!(blocks.len() >= (allocator.max_slab_index() as usize + 1) * slab_size);
        Self {
            buckets,
            blocks,
            allocator,
            slab_size,
            reclaim_counter: None,
        }
    }

    /// Counts slabs handed back to the allocator after a lost linking race.
    pub fn with_reclaim_counter(mut self, counter: &'a AtomicU64) -> Self {
        self.reclaim_counter = Some(counter);
        self
    }

    pub fn bucket_len(&self) -> usize {
        self.buckets.len()
    }

    pub fn slab_size(&self) -> usize {
        self.slab_size
    }

    pub fn allocator(&self) -> &SlabAllocator<'a> {
        &self.allocator
    }

    /// Inserts `key` into the chain of bucket `hash mod bucket_len`.
    ///
    /// The returned slot is a word index into the block region.
    pub fn insert(&self, key: Key, hash: u64) -> InsertOutcome {
        debug_assert!(is_valid_key(key));

        let Some(mut slab) = self.follow_or_grow(self.bucket(hash)) else {
            return InsertOutcome::Exhausted;
        };

        for _ in 0..=self.allocator.max_slab_index() {
            let base = self.base(slab);
            for (offset, slot) in self.key_slots(slab).iter().enumerate() {
                if let SlotStep::Done(outcome) = try_insert_at(slot, base + offset, key) {
                    return outcome;
                }
            }

            // The slab is full of other keys. Move on to the next one, growing
            // the chain if this was the last.
            match self.follow_or_grow(self.next_link(slab)) {
                Some(next) => slab = next,
                None => return InsertOutcome::Exhausted,
            }
        }

        InsertOutcome::Exhausted
    }

    /// Deletes `key` from the chain of bucket `hash mod bucket_len`.
    pub fn delete(&self, key: Key, hash: u64) -> DeleteOutcome {
        debug_assert!(is_valid_key(key));

        for slab in self.chain(hash) {
            let base = self.base(slab);
            for (offset, slot) in self.key_slots(slab).iter().enumerate() {
                match try_delete_at(slot, base + offset, key) {
                    SlotStep::Done(outcome) => return outcome,
                    // Empty slots only exist at the end of a chain.
                    SlotStep::Vacant => return DeleteOutcome::NotFound,
                    SlotStep::Next => continue,
                }
            }
        }

        DeleteOutcome::NotFound
    }

    pub fn contains(&self, key: Key, hash: u64) -> bool {
        for slab in self.chain(hash) {
            for slot in self.key_slots(slab) {
                match slot_state(slot.load(Ordering::Acquire)) {
                    SlotState::Empty => return false,
                    SlotState::Live(k) if k == key => return true,
                    SlotState::Removed(k) if k == key => return false,
                    _ => continue,
                }
            }
        }
        false
    }

    /// Returns every live key, bucket by bucket.
    pub fn live_keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for bucket in self.buckets {
            for slab in self.walk(bucket.load(Ordering::Acquire) as SlabIndex) {
                keys.extend(self.key_slots(slab).iter().filter_map(|slot| {
                    match slot_state(slot.load(Ordering::Acquire)) {
                        SlotState::Live(k) => Some(k),
                        _ => None,
                    }
                }));
            }
        }
        keys
    }

    /// Returns the number of slabs linked into chains.
    pub fn linked_slabs(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| self.walk(bucket.load(Ordering::Acquire) as SlabIndex).count())
            .sum()
    }

    /// Returns the chain length of every bucket, in slabs.
    pub fn chain_lengths(&self) -> Vec<usize> {
        self.buckets
            .iter()
            .map(|bucket| self.walk(bucket.load(Ordering::Acquire) as SlabIndex).count())
            .collect()
    }

    fn bucket(&self, hash: u64) -> &'a AtomicU64 {
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    fn chain(&self, hash: u64) -> Chain<'_, 'a> {
        self.walk(self.bucket(hash).load(Ordering::Acquire) as SlabIndex)
    }

    fn walk(&self, head: SlabIndex) -> Chain<'_, 'a> {
        Chain {
            list: self,
            next: head,
            remaining: self.allocator.max_slab_index(),
        }
    }

    #[inline]
    fn base(&self, slab: SlabIndex) -> usize {
        slab as usize * self.slab_size
    }

    #[inline]
    fn key_slots(&self, slab: SlabIndex) -> &'a [AtomicU64] {
        let base = self.base(slab);
        &self.blocks[base..base + self.slab_size - 1]
    }

    #[inline]
    fn next_link(&self, slab: SlabIndex) -> &'a AtomicU64 {
        &self.blocks[self.base(slab) + self.slab_size - 1]
    }

    /// Returns the slab `link` points to, first linking a freshly allocated one
    /// if `link` is null.
    ///
    /// If another invocation links a slab first, the one allocated here goes
    /// back to the allocator and the winner's slab is returned. Returns `None`
    /// only if the allocator is exhausted and `link` is still null.
    fn follow_or_grow(&self, link: &AtomicU64) -> Option<SlabIndex> {
        let current = link.load(Ordering::Acquire) as SlabIndex;
        if current != NULL_SLAB {
            return Some(current);
        }

        let Some(new_slab) = self.allocator.allocate() else {
            // Someone else may have grown the chain in the meantime.
            let current = link.load(Ordering::Acquire) as SlabIndex;
            return (current != NULL_SLAB).then_some(current);
        };

        match link.compare_exchange(
            u64::from(NULL_SLAB),
            u64::from(new_slab),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Some(new_slab),
            Err(winner) => {
                // Nothing was written to the slab, so it can be reused as is.
                self.allocator.reclaim(new_slab);
                if let Some(counter) = self.reclaim_counter {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                Some(winner as SlabIndex)
            }
        }
    }
}

/// Iterates over the slabs of one chain.
///
/// Bounded by the number of allocatable slabs, so a corrupted chain cannot
/// make an invocation spin forever.
struct Chain<'l, 'a> {
    list: &'l SlabList<'a>,
    next: SlabIndex,
    remaining: SlabIndex,
}

impl Iterator for Chain<'_, '_> {
    type Item = SlabIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NULL_SLAB || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let slab = self.next;
        self.next = self.list.next_link(slab).load(Ordering::Acquire) as SlabIndex;
        Some(slab)
    }
}
