// Every fixed-size record shared between the host and a dispatch is 32 words,
// regardless of how many of them a layout uses.
pub(crate) const METADATA_WORDS: usize = 32;
pub(crate) const COUNTER_WORDS: usize = 32;
pub(crate) const ALLOCATOR_STATE_WORDS: usize = 32;

/// The word value of an empty slot.
pub(crate) const EMPTY: u64 = 0;

/// The null slab index. Slab 0 is never handed out by the allocator.
pub(crate) const NULL_SLAB: u32 = 0;

// Set on a slot whose key has been deleted. The slot stays bound to that key.
pub(crate) const TOMBSTONE_TAG: u64 = 1 << 63;

// Counter word indices.
pub(crate) const INSERTED_COUNTER: usize = 0;
pub(crate) const DELETED_COUNTER: usize = 1;
pub(crate) const EXHAUSTED_COUNTER: usize = 2;
pub(crate) const CLAIMED_COUNTER: usize = 3;
pub(crate) const RECLAIMED_COUNTER: usize = 4;

// Fewest invocations of a dispatch that one worker runs as a unit.
pub(crate) const DISPATCH_CHUNK_SIZE: usize = 64;
