use std::sync::atomic::Ordering;

use super::metadata::{CounterWords, MigrateMetadata, OpsMetadata};
use crate::{
    common::hash::hash_key,
    device::{Bindings, Kernel},
    ops::OpCode,
    table::{allocator::SlabAllocator, slab_list::SlabList, slot_state, SlotState},
};

pub(super) const OPS_KERNEL: &str = "slab_list_ops";
pub(super) const MIGRATE_KERNEL: &str = "slab_list_migrate";

/// Builds the table view from four consecutive bindings starting at `first`:
/// buckets, allocator state, reclaimed stack, blocks.
fn table_at<'a>(
    bindings: &Bindings<'a>,
    first: usize,
    bucket_len: u64,
    block_size: u64,
    slab_size: u64,
    counters: CounterWords<'a>,
) -> SlabList<'a> {
    let allocator = SlabAllocator::new(bindings.get(first + 1), bindings.get(first + 2));
    SlabList::new(
        &bindings.get(first)[..bucket_len as usize],
        &bindings.get(first + 3)[..block_size as usize],
        allocator,
        slab_size as usize,
    )
    .with_reclaim_counter(counters.reclaimed())
}

pub(super) struct Ops;

impl Kernel for Ops {
    fn name(&self) -> &'static str {
        OPS_KERNEL
    }

    fn binding_count(&self) -> usize {
        6
    }

    fn invoke(&self, invocation: u32, bindings: &Bindings<'_>) {
        let meta = OpsMetadata::load(bindings.get(0));
        let counters = CounterWords::new(bindings.get(1));
        let table = table_at(
            bindings,
            2,
            meta.bucket_len,
            meta.table_words,
            meta.slab_size,
            counters,
        );

        let op = meta.generator().operation(meta.iteration, invocation);
        let hash = hash_key(op.key);
        match op.opcode {
            OpCode::Insert => counters.record_insert(table.insert(op.key, hash)),
            OpCode::Delete => counters.record_delete(table.delete(op.key, hash)),
        }
    }
}

pub(super) struct Migrate;

impl Kernel for Migrate {
    fn name(&self) -> &'static str {
        MIGRATE_KERNEL
    }

    fn binding_count(&self) -> usize {
        7
    }

    fn invoke(&self, invocation: u32, bindings: &Bindings<'_>) {
        let meta = MigrateMetadata::load(bindings.get(0));
        let index = invocation as u64;
        let slab_size = meta.slab_size;

        // Slab 0 is never allocated, and the last word of a slab is its next
        // pointer rather than a key.
        if index < slab_size || index >= meta.old_table_words || (index + 1) % slab_size == 0 {
            return;
        }

        let word = bindings.get(6)[index as usize].load(Ordering::Acquire);
        let SlotState::Live(key) = slot_state(word) else {
            return;
        };

        let counters = CounterWords::new(bindings.get(1));
        let table = table_at(
            bindings,
            2,
            meta.new_bucket_len,
            meta.new_table_words,
            slab_size,
            counters,
        );
        counters.record_insert(table.insert(key, hash_key(key)));
    }
}
