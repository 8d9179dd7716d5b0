use std::fmt;

use super::Benchmark;
use crate::{
    common::{constants::TOMBSTONE_TAG, error::ConfigError},
    generation::TableLayout,
    ops::DEFAULT_INSERT_PERCENT,
};

pub const DEFAULT_INITIAL_CAPACITY: usize = 10_000;
pub const DEFAULT_RESIZE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;
pub const DEFAULT_KEY_RANGE: u64 = 1 << 20;
pub const DEFAULT_OPS_PER_BATCH: u32 = 4_096;
pub const DEFAULT_ITERATIONS: u32 = 10;

/// The table design a benchmark runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    LinearProbing,
    SlabList { bucket_len: usize, slab_size: usize },
}

impl Backend {
    pub fn slab_list(bucket_len: usize, slab_size: usize) -> Self {
        Self::SlabList {
            bucket_len,
            slab_size,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LinearProbing => "linear probing",
            Self::SlabList { .. } => "slab list",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated benchmark configuration, built by a [`BenchmarkBuilder`].
///
/// [`BenchmarkBuilder`]: ./struct.BenchmarkBuilder.html
#[derive(Clone, Debug, PartialEq)]
pub struct BenchConfig {
    backend: Backend,
    initial_layout: TableLayout,
    resize_threshold: f64,
    growth_factor: f64,
    key_range: u64,
    ops_per_batch: u32,
    iterations: u32,
    insert_percent: u8,
}

impl BenchConfig {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// The layout of the first table generation.
    pub fn initial_layout(&self) -> TableLayout {
        self.initial_layout
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_layout.capacity()
    }

    /// Returns the load factor, as a fraction of the capacity, at which the
    /// table is resized.
    pub fn resize_threshold(&self) -> f64 {
        self.resize_threshold
    }

    /// Returns how many times the live key count a resized table can hold.
    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    /// Keys are drawn from `[1, key_range)`.
    pub fn key_range(&self) -> u64 {
        self.key_range
    }

    pub fn ops_per_batch(&self) -> u32 {
        self.ops_per_batch
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn insert_percent(&self) -> u8 {
        self.insert_percent
    }
}

/// Builds a [`BenchConfig`][config] with various configuration knobs.
///
/// [config]: ./struct.BenchConfig.html
///
/// # Examples
///
/// ```rust
/// use accel_hashbench::{Backend, Benchmark};
///
/// let config = Benchmark::builder(Backend::LinearProbing)
///     // Start with room for 50,000 keys.
///     .initial_capacity(50_000)
///     // Resize once the table is 60% full, to twice the live key count.
///     .resize_threshold(0.6)
///     .growth_factor(2.0)
///     .ops_per_batch(10_000)
///     .iterations(20)
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.key_range(), 1 << 20);
/// ```
#[derive(Clone, Debug)]
#[must_use]
pub struct BenchmarkBuilder {
    backend: Backend,
    initial_capacity: usize,
    resize_threshold: f64,
    growth_factor: f64,
    key_range: u64,
    ops_per_batch: u32,
    iterations: u32,
    insert_percent: u8,
}

impl BenchmarkBuilder {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            resize_threshold: DEFAULT_RESIZE_THRESHOLD,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            key_range: DEFAULT_KEY_RANGE,
            ops_per_batch: DEFAULT_OPS_PER_BATCH,
            iterations: DEFAULT_ITERATIONS,
            insert_percent: DEFAULT_INSERT_PERCENT,
        }
    }

    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            ..self
        }
    }

    pub fn resize_threshold(self, threshold: f64) -> Self {
        Self {
            resize_threshold: threshold,
            ..self
        }
    }

    pub fn growth_factor(self, factor: f64) -> Self {
        Self {
            growth_factor: factor,
            ..self
        }
    }

    pub fn key_range(self, range: u64) -> Self {
        Self {
            key_range: range,
            ..self
        }
    }

    pub fn ops_per_batch(self, ops: u32) -> Self {
        Self {
            ops_per_batch: ops,
            ..self
        }
    }

    pub fn iterations(self, iterations: u32) -> Self {
        Self { iterations, ..self }
    }

    pub fn insert_percent(self, percent: u8) -> Self {
        Self {
            insert_percent: percent,
            ..self
        }
    }

    /// Validates the knobs and builds the configuration.
    pub fn build(self) -> Result<BenchConfig, ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        // A migration dispatches one invocation per old table word.
        if self.initial_capacity > u32::MAX as usize {
            return Err(ConfigError::CapacityOverflow(self.initial_capacity as u64));
        }
        if !(self.resize_threshold > 0.0 && self.resize_threshold <= 1.0) {
            return Err(ConfigError::InvalidResizeThreshold(self.resize_threshold));
        }
        if !(self.growth_factor.is_finite() && self.growth_factor > 0.0) {
            return Err(ConfigError::InvalidGrowthFactor(self.growth_factor));
        }
        // Keys are drawn from `[1, key_range)` and must never carry the
        // tombstone tag.
        if self.key_range < 2 || self.key_range >= TOMBSTONE_TAG {
            return Err(ConfigError::InvalidKeyRange(self.key_range));
        }
        if self.ops_per_batch == 0 {
            return Err(ConfigError::ZeroOpsPerBatch);
        }
        if self.insert_percent > 100 {
            return Err(ConfigError::InvalidInsertPercent(self.insert_percent));
        }

        let initial_layout = match self.backend {
            Backend::LinearProbing => TableLayout::linear_probing(self.initial_capacity),
            Backend::SlabList {
                bucket_len,
                slab_size,
            } => TableLayout::slab_list(self.initial_capacity, bucket_len, slab_size)?,
        };
        if initial_layout.table_words() > u32::MAX as usize {
            return Err(ConfigError::CapacityOverflow(self.initial_capacity as u64));
        }

        Ok(BenchConfig {
            backend: self.backend,
            initial_layout,
            resize_threshold: self.resize_threshold,
            growth_factor: self.growth_factor,
            key_range: self.key_range,
            ops_per_batch: self.ops_per_batch,
            iterations: self.iterations,
            insert_percent: self.insert_percent,
        })
    }
}

impl Benchmark<'_> {
    /// Returns a builder for a benchmark of `backend`.
    pub fn builder(backend: Backend) -> BenchmarkBuilder {
        BenchmarkBuilder::new(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::{Backend, BenchmarkBuilder};
    use crate::{common::error::ConfigError, generation::TableLayout, table::layout};

    #[test]
    fn defaults_are_valid() {
        let config = BenchmarkBuilder::new(Backend::LinearProbing).build().unwrap();
        assert_eq!(config.initial_capacity(), super::DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.resize_threshold(), 0.7);
        assert_eq!(config.insert_percent(), 50);
        assert_eq!(
            config.initial_layout(),
            TableLayout::linear_probing(super::DEFAULT_INITIAL_CAPACITY)
        );
    }

    #[test]
    fn slab_list_layout_is_sized_up_front() {
        let config = BenchmarkBuilder::new(Backend::slab_list(100, 16))
            .initial_capacity(1_000)
            .build()
            .unwrap();
        assert_eq!(
            config.initial_layout().table_words(),
            layout::block_size(1_000, 16, 100)
        );
    }

    #[test]
    fn invalid_knobs_are_rejected() {
        let lp = || BenchmarkBuilder::new(Backend::LinearProbing);

        assert_eq!(
            lp().initial_capacity(0).build(),
            Err(ConfigError::ZeroCapacity)
        );
        assert_eq!(
            lp().resize_threshold(0.0).build(),
            Err(ConfigError::InvalidResizeThreshold(0.0))
        );
        assert_eq!(
            lp().resize_threshold(1.5).build(),
            Err(ConfigError::InvalidResizeThreshold(1.5))
        );
        assert!(matches!(
            lp().resize_threshold(f64::NAN).build(),
            Err(ConfigError::InvalidResizeThreshold(_))
        ));
        assert_eq!(
            lp().growth_factor(-1.0).build(),
            Err(ConfigError::InvalidGrowthFactor(-1.0))
        );
        assert_eq!(
            lp().growth_factor(f64::INFINITY).build(),
            Err(ConfigError::InvalidGrowthFactor(f64::INFINITY))
        );
        assert_eq!(lp().key_range(1).build(), Err(ConfigError::InvalidKeyRange(1)));
        assert_eq!(
            lp().key_range(u64::MAX).build(),
            Err(ConfigError::InvalidKeyRange(u64::MAX))
        );
        assert_eq!(lp().ops_per_batch(0).build(), Err(ConfigError::ZeroOpsPerBatch));
        assert_eq!(
            lp().insert_percent(101).build(),
            Err(ConfigError::InvalidInsertPercent(101))
        );

        assert_eq!(
            BenchmarkBuilder::new(Backend::slab_list(0, 4)).build(),
            Err(ConfigError::ZeroBucketLength)
        );
        assert_eq!(
            BenchmarkBuilder::new(Backend::slab_list(8, 1)).build(),
            Err(ConfigError::SlabTooSmall(1))
        );
    }

    #[test]
    fn boundary_values_are_accepted() {
        let config = BenchmarkBuilder::new(Backend::LinearProbing)
            .resize_threshold(1.0)
            .key_range(2)
            .insert_percent(100)
            .iterations(0)
            .build()
            .unwrap();
        assert_eq!(config.key_range(), 2);
        assert_eq!(config.iterations(), 0);

        assert!(BenchmarkBuilder::new(Backend::LinearProbing)
            .key_range((1 << 63) - 1)
            .build()
            .is_ok());
        assert_eq!(
            BenchmarkBuilder::new(Backend::LinearProbing)
                .key_range(1 << 63)
                .build(),
            Err(ConfigError::InvalidKeyRange(1 << 63))
        );
    }
}
