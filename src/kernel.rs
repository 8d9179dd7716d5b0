//! The kernels a benchmark dispatches.
//!
//! Every kernel reads its parameters from a metadata buffer at binding 0 and
//! counts what it did in a counter buffer at binding 1. The remaining bindings
//! are the table buffers, in the order listed on each [`KernelSource`] variant.
//!
//! [`KernelSource`]: ./enum.KernelSource.html

pub mod metadata;

mod linear_probing;
mod slab_list;

pub use metadata::{Counters, MigrateMetadata, OpsMetadata};

use crate::device::Pipeline;

/// The kernels a [`Device`](../device/trait.Device.html) can compile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelSource {
    /// One insert or delete per invocation.
    ///
    /// Bindings: metadata, counters, table.
    LinearProbingOps,
    /// Re-inserts the key of one old slot per invocation.
    ///
    /// Bindings: metadata, counters, old table, new table.
    LinearProbingMigrate,
    /// One insert or delete per invocation.
    ///
    /// Bindings: metadata, counters, buckets, allocator state, reclaimed
    /// stack, blocks.
    SlabListOps,
    /// Re-inserts the key of one old block word per invocation.
    ///
    /// Bindings: metadata, counters, new buckets, new allocator state, new
    /// reclaimed stack, new blocks, old blocks.
    SlabListMigrate,
}

impl KernelSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinearProbingOps => linear_probing::OPS_KERNEL,
            Self::LinearProbingMigrate => linear_probing::MIGRATE_KERNEL,
            Self::SlabListOps => slab_list::OPS_KERNEL,
            Self::SlabListMigrate => slab_list::MIGRATE_KERNEL,
        }
    }

    pub(crate) fn instantiate(self) -> Pipeline {
        match self {
            Self::LinearProbingOps => Pipeline::new(linear_probing::Ops),
            Self::LinearProbingMigrate => Pipeline::new(linear_probing::Migrate),
            Self::SlabListOps => Pipeline::new(slab_list::Ops),
            Self::SlabListMigrate => Pipeline::new(slab_list::Migrate),
        }
    }
}
