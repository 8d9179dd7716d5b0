use std::io;

/// The error type for invalid benchmark parameters, returned by
/// [`BenchmarkBuilder::build`][build].
///
/// [build]: ../struct.BenchmarkBuilder.html#method.build
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("initial capacity must be greater than zero")]
    ZeroCapacity,

    #[error("bucket array length must be greater than zero")]
    ZeroBucketLength,

    #[error("slab size must be at least 2 (one key slot and one next pointer), got {0}")]
    SlabTooSmall(usize),

    #[error("resize threshold must be in (0, 1], got {0}")]
    InvalidResizeThreshold(f64),

    #[error("growth factor must be a finite number greater than zero, got {0}")]
    InvalidGrowthFactor(f64),

    /// Keys are drawn from `[1, key_range)` and must stay clear of the tombstone
    /// tag bit.
    #[error("key range must be in (1, 2^63), got {0}")]
    InvalidKeyRange(u64),

    #[error("operations per batch must be greater than zero")]
    ZeroOpsPerBatch,

    #[error("insert percentage must be at most 100, got {0}")]
    InvalidInsertPercent(u8),

    /// The buffers for the requested table would not fit in the address space.
    #[error("a table of capacity {0} is too large for this platform")]
    CapacityOverflow(u64),
}

/// The error type for device operations.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    /// No device could be acquired. Fatal for a run.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("kernel `{kernel}` expects {expected} bindings but the dispatch has {actual}")]
    BindingMismatch {
        kernel: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("an invocation of kernel `{kernel}` panicked")]
    DispatchPanicked { kernel: &'static str },

    /// The device stopped before a submitted dispatch reported completion.
    #[error("device lost while a dispatch of kernel `{kernel}` was in flight")]
    DeviceLost { kernel: &'static str },
}

/// The error type for a benchmark run.
#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A migration insert could not find room in the destination table. The
    /// growth arithmetic is supposed to rule this out, so the run is aborted.
    #[error(
        "{exhausted} key(s) did not fit while migrating from capacity {old_capacity} \
    to capacity {new_capacity}; increase the growth factor"
    )]
    MigrationExhausted {
        old_capacity: u64,
        new_capacity: u64,
        exhausted: u64,
    },

    #[error("failed to write results: {0}")]
    Sink(#[from] io::Error),
}
