use std::sync::atomic::Ordering;

use super::metadata::{CounterWords, MigrateMetadata, OpsMetadata};
use crate::{
    common::hash::hash_key,
    device::{Bindings, Kernel},
    ops::OpCode,
    table::{linear_probing::LinearProbing, slot_state, SlotState},
};

pub(super) const OPS_KERNEL: &str = "linear_probing_ops";
pub(super) const MIGRATE_KERNEL: &str = "linear_probing_migrate";

pub(super) struct Ops;

impl Kernel for Ops {
    fn name(&self) -> &'static str {
        OPS_KERNEL
    }

    fn binding_count(&self) -> usize {
        3
    }

    fn invoke(&self, invocation: u32, bindings: &Bindings<'_>) {
        let meta = OpsMetadata::load(bindings.get(0));
        let counters = CounterWords::new(bindings.get(1));
        let table = LinearProbing::new(&bindings.get(2)[..meta.table_words as usize]);

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
        4
    }

    fn invoke(&self, invocation: u32, bindings: &Bindings<'_>) {
        let meta = MigrateMetadata::load(bindings.get(0));
        let index = invocation as usize;
        if index >= meta.old_table_words as usize {
            return;
        }

        // Tombstones stay behind.
        let SlotState::Live(key) = slot_state(bindings.get(2)[index].load(Ordering::Acquire))
        else {
            return;
        };

        let counters = CounterWords::new(bindings.get(1));
        let table = LinearProbing::new(&bindings.get(3)[..meta.new_table_words as usize]);
        counters.record_insert(table.insert(key, hash_key(key)));
    }
}
