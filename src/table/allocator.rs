//! A lock-free allocator of fixed-size slabs.
//!
//! Slabs are handed out by index. A bump cursor gives out fresh indices
//! starting at 1; slab 0 is the null marker and is never allocated. Slabs that
//! were allocated but never published (an invocation lost the race to link
//! them into a chain) go back on a reclaimed stack and are handed out again
//! before the cursor moves.
//!
//! The reclaimed stack is a Treiber stack threaded through a separate link
//! buffer: `links[s]` holds the slab below `s`. Its head word packs a version
//! counter in the upper 32 bits and the top slab index in the lower 32 bits,
//! so a pop that raced with a pop and push of the same slab fails its CAS
//! instead of installing a stale link.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::Backoff;

use crate::common::constants::{ALLOCATOR_STATE_WORDS, NULL_SLAB};

/// A slab index. `0` means "no slab".
pub type SlabIndex = u32;

// Allocator state word indices.
pub(crate) const MAX_SLAB_INDEX: usize = 0;
pub(crate) const NEXT_CURSOR: usize = 1;
pub(crate) const FREE_HEAD: usize = 2;

const INDEX_MASK: u64 = 0xffff_ffff;

#[inline]
fn unpack(head: u64) -> (u64, SlabIndex) {
    (head >> 32, (head & INDEX_MASK) as SlabIndex)
}

#[inline]
fn pack(version: u64, index: SlabIndex) -> u64 {
    (version.wrapping_add(1) << 32) | u64::from(index)
}

/// A view of the allocator state and reclaimed-stack buffers.
#[derive(Clone, Copy)]
pub struct SlabAllocator<'a> {
    state: &'a [AtomicU64],
    links: &'a [AtomicU64],
}

impl<'a> SlabAllocator<'a> {
    /// # Panics
    ///
    /// Panics if the state buffer is too short or the link buffer cannot hold a
    /// link for every allocatable slab.
    pub fn new(state: &'a [AtomicU64], links: &'a [AtomicU64]) -> Self {
        assert!(state.len() > FREE_HEAD);
        let allocator = Self { state, links };
        assert!(links.len() > allocator.max_slab_index() as usize);
        allocator
    }

    /// Returns the initial contents of the state buffer for a block region of
    /// `block_size` words split into slabs of `slab_size` words.
    pub fn initial_state(block_size: usize, slab_size: usize) -> [u64; ALLOCATOR_STATE_WORDS] {
        assert!(slab_size >= 2);
        let mut state = [0; ALLOCATOR_STATE_WORDS];
        // The first slab of the region is never allocated.
        state[MAX_SLAB_INDEX] = (block_size.saturating_sub(slab_size) / slab_size) as u64;
        state[NEXT_CURSOR] = 1;
        state
    }

    pub fn max_slab_index(&self) -> SlabIndex {
        self.state[MAX_SLAB_INDEX].load(Ordering::Relaxed) as SlabIndex
    }

    /// Returns the number of slabs ever handed out by the bump cursor.
    pub fn bumped(&self) -> u32 {
        let cursor = self.state[NEXT_CURSOR].load(Ordering::Acquire);
        (cursor - 1).min(u64::from(self.max_slab_index())) as u32
    }

    /// Allocates a slab. Returns `None` once every slab is in use.
    ///
    /// A slab returned by this method has never been written to, or was
    /// reclaimed without having been written to.
    pub fn allocate(&self) -> Option<SlabIndex> {
        if let Some(index) = self.pop_reclaimed() {
            return Some(index);
        }

        let index = self.state[NEXT_CURSOR].fetch_add(1, Ordering::AcqRel);
        if index <= u64::from(self.max_slab_index()) {
            Some(index as SlabIndex)
        } else {
            // Exhausted. The cursor stays past the end.
            None
        }
    }

    /// Returns a slab that was allocated but never linked into a chain.
    ///
    /// # Panics
    ///
    /// Panics if `index` is the null slab or out of range.
    pub fn reclaim(&self, index: SlabIndex) {
        assert!(index != NULL_SLAB && index <= self.max_slab_index());

        let head = &self.state[FREE_HEAD];
        let backoff = Backoff::new();
        let mut current = head.load(Ordering::Acquire);
        loop {
            let (version, top) = unpack(current);
            self.links[index as usize].store(u64::from(top), Ordering::Relaxed);

            match head.compare_exchange_weak(
                current,
                pack(version, index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    backoff.spin();
                }
            }
        }
    }

    /// Returns the number of slabs currently on the reclaimed stack.
    ///
    /// Only meaningful while no dispatch is running.
    pub fn reclaimed_len(&self) -> usize {
        let (_, mut top) = unpack(self.state[FREE_HEAD].load(Ordering::Acquire));
        let mut len = 0;
        while top != NULL_SLAB {
            len += 1;
            top = self.links[top as usize].load(Ordering::Relaxed) as SlabIndex;
        }
        len
    }

    fn pop_reclaimed(&self) -> Option<SlabIndex> {
        let head = &self.state[FREE_HEAD];
        let backoff = Backoff::new();
        let mut current = head.load(Ordering::Acquire);
        loop {
            let (version, top) = unpack(current);
            if top == NULL_SLAB {
                return None;
            }
            let below = self.links[top as usize].load(Ordering::Relaxed) as SlabIndex;

            match head.compare_exchange_weak(
                current,
                pack(version, below),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(top),
                Err(actual) => {
                    current = actual;
                    backoff.spin();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SlabAllocator;
    use crate::common::test_utils::{words_from, zeroed_words};
    use std::{
        collections::HashSet,
        sync::{atomic::AtomicU64, Arc, Barrier},
    };

    type Words = Box<[AtomicU64]>;

    fn buffers(block_size: usize, slab_size: usize) -> (Words, Words) {
        let state = words_from(&SlabAllocator::initial_state(block_size, slab_size));
        let links = zeroed_words(block_size / slab_size);
        (state, links)
    }

    #[test]
    fn never_yields_slab_zero_and_exhausts_deterministically() {
        // 10 slabs of 4 words; slab 0 is padding.
        let (state, links) = buffers(40, 4);
        let allocator = SlabAllocator::new(&state, &links);
        assert_eq!(allocator.max_slab_index(), 9);

        let allocated: Vec<_> = (0..9).map(|_| allocator.allocate()).collect();
        assert_eq!(allocated, (1..=9).map(Some).collect::<Vec<_>>());

        assert_eq!(allocator.allocate(), None);
        assert_eq!(allocator.allocate(), None);
        assert_eq!(allocator.bumped(), 9);
    }

    #[test]
    fn reclaimed_slabs_are_reused_first() {
        let (state, links) = buffers(40, 4);
        let allocator = SlabAllocator::new(&state, &links);

        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        allocator.reclaim(a);
        allocator.reclaim(b);
        assert_eq!(allocator.reclaimed_len(), 2);

        // Last in, first out.
        assert_eq!(allocator.allocate(), Some(b));
        assert_eq!(allocator.allocate(), Some(a));
        assert_eq!(allocator.allocate(), Some(3));
        assert_eq!(allocator.reclaimed_len(), 0);
    }

    #[test]
    #[should_panic]
    fn reclaiming_the_null_slab_panics() {
        let (state, links) = buffers(40, 4);
        SlabAllocator::new(&state, &links).reclaim(0);
    }

    #[test]
    fn concurrent_allocate_and_reclaim_hand_out_each_slab_once() {
        const NUM_THREADS: usize = 8;
        const SLABS: usize = 1_024;

        let (state, links) = buffers((SLABS + 1) * 2, 2);
        let state: Arc<[_]> = state.into();
        let links: Arc<[_]> = links.into();
        let barrier = Arc::new(Barrier::new(NUM_THREADS));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let state = Arc::clone(&state);
                let links = Arc::clone(&links);
                let barrier = Arc::clone(&barrier);

                std::thread::spawn(move || {
                    let allocator = SlabAllocator::new(&state, &links);
                    let mut kept = Vec::new();
                    let mut churn = 0;
                    barrier.wait();
                    while let Some(index) = allocator.allocate() {
                        // Give back some slabs to churn the reclaimed stack.
                        if churn < 128 && (index as usize + t) % 2 == 0 {
                            churn += 1;
                            allocator.reclaim(index);
                        } else {
                            kept.push(index);
                        }
                    }
                    kept
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for index in t.join().unwrap() {
                assert_ne!(index, 0);
                assert!(seen.insert(index), "slab {index} handed out twice");
            }
        }

        let allocator = SlabAllocator::new(&state, &links);
        assert_eq!(seen.len() + allocator.reclaimed_len(), SLABS);
    }
}
