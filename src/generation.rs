//! One generation of table buffers.
//!
//! A benchmark starts with a generation sized for the initial capacity. Every
//! resize creates the next generation, migrates the live keys of the current
//! one into it, and retires the current one. Retiring consumes the generation,
//! so it cannot happen while a dispatch still borrows its buffers.

use std::sync::atomic::AtomicU64;

use smallvec::SmallVec;

use crate::{
    common::error::{ConfigError, DeviceError},
    device::{Device, DeviceBuffer},
    table::{
        allocator::SlabAllocator, layout, linear_probing::LinearProbing, slab_list::SlabList, Key,
    },
};

/// The shape of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableLayout {
    LinearProbing {
        capacity: usize,
    },
    SlabList {
        capacity: usize,
        bucket_len: usize,
        slab_size: usize,
        block_size: usize,
    },
}

impl TableLayout {
    pub fn linear_probing(capacity: usize) -> Self {
        Self::LinearProbing { capacity }
    }

    /// Sizes a slab list for `capacity` keys.
    ///
    /// Returns an error if the bucket array is empty, a slab has no key slot,
    /// or the block region would have more slabs than a slab index can
    /// address.
    pub fn slab_list(
        capacity: usize,
        bucket_len: usize,
        slab_size: usize,
    ) -> Result<Self, ConfigError> {
        if bucket_len == 0 {
            return Err(ConfigError::ZeroBucketLength);
        }
        if slab_size < 2 {
            return Err(ConfigError::SlabTooSmall(slab_size));
        }
        let overflow = || ConfigError::CapacityOverflow(capacity as u64);

        let key_slabs = capacity
            .checked_add(slab_size - 2)
            .map(|c| c / (slab_size - 1))
            .ok_or_else(overflow)?;
        let block_size = key_slabs
            .checked_add(bucket_len)
            .and_then(|s| s.checked_add(1))
            .and_then(|s| s.checked_mul(slab_size))
            .ok_or_else(overflow)?;
        if layout::slab_count(block_size, slab_size) > u32::MAX as usize {
            return Err(overflow());
        }
        debug_assert_eq!(block_size, layout::block_size(capacity, slab_size, bucket_len));

        Ok(Self::SlabList {
            capacity,
            bucket_len,
            slab_size,
            block_size,
        })
    }

    pub fn capacity(&self) -> usize {
        match self {
            Self::LinearProbing { capacity } | Self::SlabList { capacity, .. } => *capacity,
        }
    }

    /// The length of the buffer that holds the keys: the slot array of a
    /// linear-probing table or the block region of a slab list.
    pub fn table_words(&self) -> usize {
        match self {
            Self::LinearProbing { capacity } => *capacity,
            Self::SlabList { block_size, .. } => *block_size,
        }
    }

    pub fn bucket_len(&self) -> Option<usize> {
        match self {
            Self::LinearProbing { .. } => None,
            Self::SlabList { bucket_len, .. } => Some(*bucket_len),
        }
    }

    pub fn slab_size(&self) -> Option<usize> {
        match self {
            Self::LinearProbing { .. } => None,
            Self::SlabList { slab_size, .. } => Some(*slab_size),
        }
    }

    /// Returns the layout of the same kind for `new_capacity` keys. A slab
    /// list scales its bucket array along with the capacity.
    pub fn resized(&self, new_capacity: usize) -> Result<Self, ConfigError> {
        match *self {
            Self::LinearProbing { .. } => Ok(Self::linear_probing(new_capacity)),
            Self::SlabList {
                capacity,
                bucket_len,
                slab_size,
                ..
            } => Self::slab_list(
                new_capacity,
                layout::scaled_bucket_len(new_capacity, capacity, bucket_len),
                slab_size,
            ),
        }
    }
}

enum Buffers {
    LinearProbing {
        table: DeviceBuffer,
    },
    SlabList {
        buckets: DeviceBuffer,
        allocator: DeviceBuffer,
        reclaimed: DeviceBuffer,
        blocks: DeviceBuffer,
    },
}

/// The device buffers of one table generation.
pub struct Generation {
    index: u32,
    layout: TableLayout,
    buffers: Buffers,
}

impl Generation {
    /// Allocates empty buffers for `layout`.
    pub fn create<D>(device: &D, index: u32, layout: TableLayout) -> Result<Self, DeviceError>
    where
        D: Device + ?Sized,
    {
        let buffers = match layout {
            TableLayout::LinearProbing { capacity } => Buffers::LinearProbing {
                table: device.create_buffer("table", capacity)?,
            },
            TableLayout::SlabList {
                bucket_len,
                slab_size,
                block_size,
                ..
            } => Buffers::SlabList {
                buckets: device.create_buffer("buckets", bucket_len)?,
                allocator: device.create_buffer_init(
                    "allocator state",
                    &SlabAllocator::initial_state(block_size, slab_size),
                )?,
                reclaimed: device
                    .create_buffer("reclaimed stack", layout::slab_count(block_size, slab_size))?,
                blocks: device.create_buffer("blocks", block_size)?,
            },
        };

        log::debug!("created table generation {index}: {layout:?}");
        Ok(Self {
            index,
            layout,
            buffers,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// The buffers an operations dispatch binds after metadata and counters.
    pub fn table_buffers(&self) -> SmallVec<[&DeviceBuffer; 4]> {
        match &self.buffers {
            Buffers::LinearProbing { table } => smallvec::smallvec![table],
            Buffers::SlabList {
                buckets,
                allocator,
                reclaimed,
                blocks,
            } => smallvec::smallvec![buckets, allocator, reclaimed, blocks],
        }
    }

    /// The buffer holding the keys. A migration out of this generation reads
    /// only this one.
    pub fn key_buffer(&self) -> &DeviceBuffer {
        match &self.buffers {
            Buffers::LinearProbing { table } => table,
            Buffers::SlabList { blocks, .. } => blocks,
        }
    }

    /// The buffers a migration from `self` into `target` binds after metadata
    /// and counters.
    pub fn migration_buffers<'a>(
        &'a self,
        target: &'a Generation,
    ) -> SmallVec<[&'a DeviceBuffer; 5]> {
        let mut buffers = SmallVec::new();
        match self.buffers {
            Buffers::LinearProbing { .. } => {
                buffers.push(self.key_buffer());
                buffers.extend(target.table_buffers());
            }
            Buffers::SlabList { .. } => {
                buffers.extend(target.table_buffers());
                buffers.push(self.key_buffer());
            }
        }
        buffers
    }

    /// Copies the table back to the host and returns every live key.
    pub fn live_keys<D>(&self, device: &D) -> Result<Vec<Key>, DeviceError>
    where
        D: Device + ?Sized,
    {
        let copy = |buffer: &DeviceBuffer| -> Result<Box<[AtomicU64]>, DeviceError> {
            Ok(device
                .read_buffer(buffer)?
                .into_iter()
                .map(AtomicU64::new)
                .collect())
        };

        let keys = match (&self.buffers, self.layout) {
            (Buffers::LinearProbing { table }, _) => LinearProbing::new(&copy(table)?).live_keys(),
            (
                Buffers::SlabList {
                    buckets,
                    allocator,
                    reclaimed,
                    blocks,
                },
                TableLayout::SlabList { slab_size, .. },
            ) => {
                let (state, links) = (copy(allocator)?, copy(reclaimed)?);
                let (buckets, blocks) = (copy(buckets)?, copy(blocks)?);
                SlabList::new(
                    &buckets,
                    &blocks,
                    SlabAllocator::new(&state, &links),
                    slab_size,
                )
                .live_keys()
            }
            (Buffers::SlabList { .. }, TableLayout::LinearProbing { .. }) => {
                unreachable!("slab-list buffers with a linear-probing layout")
            }
        };
        Ok(keys)
    }

    /// Destroys every buffer of this generation.
    pub fn retire<D>(self, device: &D)
    where
        D: Device + ?Sized,
    {
        match self.buffers {
            Buffers::LinearProbing { table } => device.destroy_buffer(table),
            Buffers::SlabList {
                buckets,
                allocator,
                reclaimed,
                blocks,
            } => {
                device.destroy_buffer(buckets);
                device.destroy_buffer(allocator);
                device.destroy_buffer(reclaimed);
                device.destroy_buffer(blocks);
            }
        }
        log::debug!("retired table generation {}", self.index);
    }
}
