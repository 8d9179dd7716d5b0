//! The fixed-size records shared between the host and a dispatch.
//!
//! Metadata is written by the host before a dispatch and only read by
//! invocations. Counters are zeroed by the host, incremented by invocations and
//! read back once the dispatch has completed.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    common::constants::{
        CLAIMED_COUNTER, COUNTER_WORDS, DELETED_COUNTER, EXHAUSTED_COUNTER, INSERTED_COUNTER,
        METADATA_WORDS, RECLAIMED_COUNTER,
    },
    ops::OperationGenerator,
    table::{DeleteOutcome, InsertOutcome},
};

/// Parameters of an operations batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpsMetadata {
    /// The capacity of a linear-probing table, or the block size of a slab
    /// list, in words.
    pub table_words: u64,
    /// Unused by linear probing.
    pub slab_size: u64,
    /// Unused by linear probing.
    pub bucket_len: u64,
    pub iteration: u32,
    pub key_range: u64,
    pub insert_percent: u8,
}

impl OpsMetadata {
    pub fn to_words(&self) -> [u64; METADATA_WORDS] {
        let mut words = [0; METADATA_WORDS];
        words[0] = self.table_words;
        words[1] = self.slab_size;
        words[2] = self.bucket_len;
        words[3] = u64::from(self.iteration);
        words[4] = self.key_range;
        words[5] = u64::from(self.insert_percent);
        words
    }

    pub(crate) fn load(words: &[AtomicU64]) -> Self {
        let word = |i: usize| words[i].load(Ordering::Relaxed);
        Self {
            table_words: word(0),
            slab_size: word(1),
            bucket_len: word(2),
            iteration: word(3) as u32,
            key_range: word(4),
            insert_percent: word(5) as u8,
        }
    }

    pub(crate) fn generator(&self) -> OperationGenerator {
        OperationGenerator::new(self.key_range, self.insert_percent)
    }
}

/// Parameters of a migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrateMetadata {
    /// The capacity (linear probing) or block size (slab list) of the source.
    pub old_table_words: u64,
    /// The capacity (linear probing) or block size (slab list) of the
    /// destination.
    pub new_table_words: u64,
    pub slab_size: u64,
    pub new_bucket_len: u64,
}

impl MigrateMetadata {
    pub fn to_words(&self) -> [u64; METADATA_WORDS] {
        let mut words = [0; METADATA_WORDS];
        words[0] = self.old_table_words;
        words[1] = self.new_table_words;
        words[2] = self.slab_size;
        words[3] = self.new_bucket_len;
        words
    }

    pub(crate) fn load(words: &[AtomicU64]) -> Self {
        let word = |i: usize| words[i].load(Ordering::Relaxed);
        Self {
            old_table_words: word(0),
            new_table_words: word(1),
            slab_size: word(2),
            new_bucket_len: word(3),
        }
    }
}

/// The counters of a completed dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Keys that became live: fresh claims plus revived tombstones.
    pub inserted: u64,
    pub deleted: u64,
    /// Inserts that found no room.
    pub exhausted: u64,
    /// Inserts that claimed a previously empty slot.
    pub claimed: u64,
    /// Slabs handed back to the allocator after losing a linking race.
    pub reclaimed: u64,
}

impl Counters {
    pub const fn zeroed_words() -> [u64; COUNTER_WORDS] {
        [0; COUNTER_WORDS]
    }

    /// Reads the counters out of a copy of the counter buffer.
    ///
    /// # Panics
    ///
    /// Panics if `words` is shorter than the counter record.
    pub fn from_words(words: &[u64]) -> Self {
        assert!(words.len() >= COUNTER_WORDS);
        Self {
            inserted: words[INSERTED_COUNTER],
            deleted: words[DELETED_COUNTER],
            exhausted: words[EXHAUSTED_COUNTER],
            claimed: words[CLAIMED_COUNTER],
            reclaimed: words[RECLAIMED_COUNTER],
        }
    }
}

/// The counter buffer as seen by an invocation.
#[derive(Clone, Copy)]
pub(crate) struct CounterWords<'a> {
    words: &'a [AtomicU64],
}

impl<'a> CounterWords<'a> {
    pub(crate) fn new(words: &'a [AtomicU64]) -> Self {
        assert!(words.len() >= COUNTER_WORDS);
        Self { words }
    }

    pub(crate) fn reclaimed(&self) -> &'a AtomicU64 {
        &self.words[RECLAIMED_COUNTER]
    }

    pub(crate) fn record_insert(&self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted { .. } => {
                self.bump(INSERTED_COUNTER);
                self.bump(CLAIMED_COUNTER);
            }
            InsertOutcome::Revived { .. } => self.bump(INSERTED_COUNTER),
            InsertOutcome::AlreadyPresent { .. } => (),
            InsertOutcome::Exhausted => self.bump(EXHAUSTED_COUNTER),
        }
    }

    pub(crate) fn record_delete(&self, outcome: DeleteOutcome) {
        if let DeleteOutcome::Deleted { .. } = outcome {
            self.bump(DELETED_COUNTER);
        }
    }

    #[inline]
    fn bump(&self, index: usize) {
        self.words[index].fetch_add(1, Ordering::Relaxed);
    }
}
