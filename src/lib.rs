#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Lock-free hash tables that live in device memory, and a batch benchmark that
//! drives them.
//!
//! A table is a set of buffers of 64-bit atomic words owned by a [`Device`].
//! Batches of logically-parallel invocations mutate the table with nothing but
//! compare-and-swap on individual words. Two table designs are provided:
//!
//! - **Linear probing**: a flat array of key slots.
//! - **Slab lists**: an array of bucket heads, each the start of a chain of
//!   fixed-size slabs carved out of a shared block region by a lock-free slab
//!   allocator.
//!
//! When a table fills up past the configured threshold, the [`Benchmark`]
//! orchestrator allocates a larger generation of buffers, migrates every live
//! key into it with a parallel dispatch, waits for that dispatch to complete,
//! and only then destroys the old buffers.
//!
//! # Example
//!
//! ```rust
//! use accel_hashbench::{Backend, Benchmark, CollectingSink, CpuDevice};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = CpuDevice::new(2)?;
//! let config = Benchmark::builder(Backend::slab_list(64, 8))
//!     .initial_capacity(1_000)
//!     .ops_per_batch(256)
//!     .iterations(4)
//!     .build()?;
//!
//! let mut sink = CollectingSink::default();
//! let summary = Benchmark::new(&device, config)?.run(&mut sink)?;
//! assert_eq!(sink.iterations.len(), 4);
//! assert_eq!(summary.live_keys, summary.inserted - summary.deleted);
//! # Ok(())
//! # }
//! ```
//!
//! [`Device`]: ./device/trait.Device.html
//! [`Benchmark`]: ./struct.Benchmark.html

pub mod bench;
pub mod device;
pub mod generation;
pub mod kernel;
pub mod ops;
pub mod table;

pub(crate) mod common;

pub use bench::{
    builder::{Backend, BenchConfig, BenchmarkBuilder},
    report::{CollectingSink, IterationReport, LogSink, ResizeReport, ResultSink, TextSink},
    Benchmark, RunSummary,
};
pub use common::error::{BenchError, ConfigError, DeviceError};
pub use common::hash::{hash_key, mix64};
pub use device::{cpu::CpuDevice, Device};
pub use table::Key;
