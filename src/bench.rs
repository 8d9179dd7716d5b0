//! The host side of a benchmark run.
//!
//! A [`Benchmark`] owns the current table [`Generation`] and drives it one
//! batch at a time:
//!
//! 1. If the table has filled past the resize threshold, resize it: create the
//!    next generation, dispatch a migration of every live key, wait for it,
//!    and only then retire the old generation.
//! 2. Dispatch one batch of operations, wait for it, and read its counters.
//! 3. Report the iteration to the [`ResultSink`].
//!
//! At most one dispatch is in flight at any time.
//!
//! [`Benchmark`]: ./struct.Benchmark.html
//! [`Generation`]: ../generation/struct.Generation.html
//! [`ResultSink`]: ./report/trait.ResultSink.html

pub mod builder;
pub mod policy;
pub mod report;

use std::time::Duration;

use self::{
    builder::BenchConfig,
    policy::{ResizePolicy, Totals},
    report::{IterationReport, ResizeReport, ResultSink},
};
use crate::{
    common::{
        error::{BenchError, ConfigError},
        time::{self, Clock},
    },
    device::{Device, DeviceBuffer, Dispatch, Pipeline},
    generation::{Generation, TableLayout},
    kernel::{Counters, KernelSource, MigrateMetadata, OpsMetadata},
    table::Key,
};

/// What a finished run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u32,
    /// Keys that became live, over the whole run.
    pub inserted: u64,
    /// Keys that were deleted, over the whole run.
    pub deleted: u64,
    /// Inserts that found no room, over the whole run.
    pub exhausted: u64,
    pub resizes: u32,
    pub final_capacity: usize,
    /// The number of live keys in the table at the end of the run.
    pub live_keys: u64,
    pub elapsed: Duration,
}

/// A benchmark run against one device.
pub struct Benchmark<'d> {
    device: &'d dyn Device,
    config: BenchConfig,
    policy: ResizePolicy,
    ops_pipeline: Pipeline,
    migrate_pipeline: Pipeline,
    // Only `None` while being dropped.
    generation: Option<Generation>,
    totals: Totals,
    summary: RunSummary,
    next_iteration: u32,
    clock: Clock,
}

impl<'d> Benchmark<'d> {
    /// Compiles the kernels for the configured backend and creates the first
    /// table generation.
    pub fn new(device: &'d dyn Device, config: BenchConfig) -> Result<Self, BenchError> {
        let initial_layout = config.initial_layout();
        let (ops, migrate) = match initial_layout {
            TableLayout::LinearProbing { .. } => (
                KernelSource::LinearProbingOps,
                KernelSource::LinearProbingMigrate,
            ),
            TableLayout::SlabList { .. } => {
                (KernelSource::SlabListOps, KernelSource::SlabListMigrate)
            }
        };
        let ops_pipeline = device.compile(ops)?;
        let migrate_pipeline = device.compile(migrate)?;

        let generation = Generation::create(device, 0, initial_layout)?;
        let policy = ResizePolicy::new(
            config.resize_threshold(),
            config.growth_factor(),
            u64::from(config.ops_per_batch()),
        );

        log::info!(
            "starting {} benchmark: capacity {}, {} iteration(s) of {} operations",
            config.backend(),
            initial_layout.capacity(),
            config.iterations(),
            config.ops_per_batch()
        );

        Ok(Self {
            device,
            config,
            policy,
            ops_pipeline,
            migrate_pipeline,
            generation: Some(generation),
            totals: Totals::default(),
            summary: RunSummary {
                final_capacity: initial_layout.capacity(),
                ..RunSummary::default()
            },
            next_iteration: 0,
            clock: Clock::new(),
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.generation().layout().capacity()
    }

    pub fn layout(&self) -> TableLayout {
        *self.generation().layout()
    }

    /// Running totals since the last resize.
    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Copies the table back to the host and returns every live key.
    pub fn live_keys(&self) -> Result<Vec<Key>, BenchError> {
        Ok(self.generation().live_keys(self.device)?)
    }

    /// Runs every configured iteration, then checks the table and releases
    /// its buffers.
    pub fn run<S>(mut self, sink: &mut S) -> Result<RunSummary, BenchError>
    where
        S: ResultSink + ?Sized,
    {
        sink.record_config(&self.config)?;
        while self.next_iteration < self.config.iterations() {
            self.run_iteration(sink)?;
        }

        self.summary.live_keys = self.live_keys()?.len() as u64;
        log::info!("benchmark finished: {:?}", self.summary);
        Ok(self.summary.clone())
    }

    /// Runs the next iteration: a resize if one is due, then one batch of
    /// operations.
    pub fn run_iteration<S>(&mut self, sink: &mut S) -> Result<IterationReport, BenchError>
    where
        S: ResultSink + ?Sized,
    {
        let iteration = self.next_iteration;
        let start = self.clock.now();

        if self.policy.should_resize(&self.totals, self.capacity()) {
            self.resize(iteration, sink)?;
        }

        let counters = self.dispatch_ops(iteration)?;
        self.totals.record(&counters);
        if counters.exhausted > 0 {
            log::warn!(
                "iteration {}: {} insert(s) found no room in a table of capacity {}",
                iteration + 1,
                counters.exhausted,
                self.capacity()
            );
        }

        let elapsed = self.clock.now().duration_since(start);
        let report = IterationReport {
            iteration,
            elapsed,
            inserted: counters.inserted,
            deleted: counters.deleted,
            exhausted: counters.exhausted,
            throughput: time::throughput(u64::from(self.config.ops_per_batch()), elapsed),
        };
        sink.record_iteration(&report)?;

        self.next_iteration += 1;
        self.summary.iterations += 1;
        self.summary.inserted += counters.inserted;
        self.summary.deleted += counters.deleted;
        self.summary.exhausted += counters.exhausted;
        self.summary.elapsed += elapsed;
        Ok(report)
    }

    fn generation(&self) -> &Generation {
        self.generation
            .as_ref()
            .expect("a table generation is installed until the benchmark is dropped")
    }

    fn dispatch_ops(&self, iteration: u32) -> Result<Counters, BenchError> {
        let generation = self.generation();
        let layout = generation.layout();
        let metadata = OpsMetadata {
            table_words: layout.table_words() as u64,
            slab_size: layout.slab_size().unwrap_or_default() as u64,
            bucket_len: layout.bucket_len().unwrap_or_default() as u64,
            iteration,
            key_range: self.config.key_range(),
            insert_percent: self.config.insert_percent(),
        };

        self.dispatch(
            &self.ops_pipeline,
            &metadata.to_words(),
            self.config.ops_per_batch(),
            &generation.table_buffers(),
        )
    }

    fn resize<S>(&mut self, iteration: u32, sink: &mut S) -> Result<(), BenchError>
    where
        S: ResultSink + ?Sized,
    {
        let start = self.clock.now();
        let old = self.generation();
        let old_layout = *old.layout();

        let new_capacity = self.policy.new_capacity(&self.totals);
        let new_layout = usize::try_from(new_capacity)
            .map_err(|_| ConfigError::CapacityOverflow(new_capacity))
            .and_then(|capacity| old_layout.resized(capacity))?;
        // Both dispatches address table words by invocation index.
        if new_layout.table_words() > u32::MAX as usize {
            return Err(ConfigError::CapacityOverflow(new_capacity).into());
        }

        let new = Generation::create(self.device, old.index() + 1, new_layout)?;
        let metadata = MigrateMetadata {
            old_table_words: old_layout.table_words() as u64,
            new_table_words: new_layout.table_words() as u64,
            slab_size: new_layout.slab_size().unwrap_or_default() as u64,
            new_bucket_len: new_layout.bucket_len().unwrap_or_default() as u64,
        };
        let migrated = self.dispatch(
            &self.migrate_pipeline,
            &metadata.to_words(),
            old_layout.table_words() as u32,
            &old.migration_buffers(&new),
        );

        let counters = match migrated {
            Ok(counters) if counters.exhausted == 0 => counters,
            Ok(counters) => {
                new.retire(self.device);
                return Err(BenchError::MigrationExhausted {
                    old_capacity: old_layout.capacity() as u64,
                    new_capacity,
                    exhausted: counters.exhausted,
                });
            }
            Err(e) => {
                new.retire(self.device);
                return Err(e);
            }
        };
        debug_assert_eq!(counters.inserted, self.totals.net());

        // The migration has completed, so nothing references the old buffers.
        if let Some(old) = self.generation.replace(new) {
            old.retire(self.device);
        }
        self.totals.reset_after_resize();
        self.summary.resizes += 1;
        self.summary.final_capacity = new_layout.capacity();

        let report = ResizeReport {
            iteration,
            old_capacity: old_layout.capacity(),
            new_capacity: new_layout.capacity(),
            new_layout,
            migrated: counters.inserted,
            elapsed: self.clock.now().duration_since(start),
        };
        log::debug!(
            "resized from {:?} to {:?}, {} key(s) migrated",
            old_layout,
            new_layout,
            report.migrated
        );
        sink.record_resize(&report)?;
        Ok(())
    }

    /// Runs one dispatch with freshly created metadata and counter buffers,
    /// waits for it, and returns its counters.
    ///
    /// `tables` are bound in order after the metadata and counters.
    fn dispatch(
        &self,
        pipeline: &Pipeline,
        metadata: &[u64],
        invocations: u32,
        tables: &[&DeviceBuffer],
    ) -> Result<Counters, BenchError> {
        let device = self.device;
        let metadata = device.create_buffer_init("metadata", metadata)?;
        let counters = match device.create_buffer_init("counters", &Counters::zeroed_words()) {
            Ok(counters) => counters,
            Err(e) => {
                device.destroy_buffer(metadata);
                return Err(e.into());
            }
        };

        let mut dispatch = Dispatch::new(pipeline, invocations)
            .bind(&metadata)
            .bind(&counters);
        for &buffer in tables {
            dispatch = dispatch.bind(buffer);
        }
        let result = device
            .submit(dispatch)
            .and_then(|pending| device.wait(pending))
            .and_then(|()| device.read_buffer(&counters));

        device.destroy_buffer(metadata);
        device.destroy_buffer(counters);
        Ok(Counters::from_words(&result?))
    }
}

impl Drop for Benchmark<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.generation.take() {
            generation.retire(self.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        builder::Backend,
        report::{IterationReport, ResizeReport, ResultSink},
        Benchmark,
    };
    use crate::{
        bench::report::CollectingSink,
        common::{
            error::BenchError,
            time::{Clock, Mock},
        },
        device::cpu::CpuDevice,
        ops::{OpCode, OperationGenerator},
    };
    use std::{collections::HashSet, io, sync::Arc, time::Duration};

    #[test]
    fn resize_happens_once_the_threshold_is_crossed() {
        // Every key of the first three batches is distinct, so each batch adds
        // exactly 256 live keys: 256, 512, 768. 768 crosses 0.7 * 1,000.
        let key_range = 1 << 40;
        let generator = OperationGenerator::new(key_range, 100);
        let keys: HashSet<_> = (0..3)
            .flat_map(|i| (0..256).map(move |j| generator.operation(i, j).key))
            .collect();
        assert_eq!(keys.len(), 768);

        let device = CpuDevice::new(4).unwrap();
        let config = Benchmark::builder(Backend::LinearProbing)
            .initial_capacity(1_000)
            .resize_threshold(0.7)
            .growth_factor(2.0)
            .ops_per_batch(256)
            .key_range(key_range)
            .insert_percent(100)
            .iterations(4)
            .build()
            .unwrap();

        let mut sink = CollectingSink::default();
        let mut bench = Benchmark::new(&device, config).unwrap();
        for _ in 0..3 {
            bench.run_iteration(&mut sink).unwrap();
            assert_eq!(bench.capacity(), 1_000);
        }
        assert_eq!(bench.totals().net(), 768);
        assert!(sink.resizes.is_empty());

        bench.run_iteration(&mut sink).unwrap();
        assert_eq!(sink.resizes.len(), 1);
        let resize = &sink.resizes[0];
        assert_eq!(resize.iteration, 3);
        assert_eq!(resize.old_capacity, 1_000);
        assert_eq!(resize.new_capacity, 1_536);
        assert_eq!(resize.migrated, 768);
        assert_eq!(bench.capacity(), 1_536);

        // The live set is the first three batches plus the fourth.
        let mut expected = keys;
        expected.extend((0..256).map(|j| generator.operation(3, j).key));
        let live: HashSet<_> = bench.live_keys().unwrap().into_iter().collect();
        assert_eq!(live, expected);

        drop(bench);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn mixed_workload_keeps_counts_consistent() {
        let device = CpuDevice::new(3).unwrap();
        let config = Benchmark::builder(Backend::slab_list(64, 4))
            .initial_capacity(1_000)
            .ops_per_batch(256)
            .key_range(10_000)
            .iterations(16)
            .build()
            .unwrap();

        let mut sink = CollectingSink::default();
        let summary = Benchmark::new(&device, config).unwrap().run(&mut sink).unwrap();

        assert_eq!(summary.iterations, 16);
        assert_eq!(sink.iterations.len(), 16);
        assert!(summary.resizes >= 1);
        assert_eq!(summary.exhausted, 0);
        assert_eq!(summary.live_keys, summary.inserted - summary.deleted);
        assert_eq!(
            summary.inserted,
            sink.iterations.iter().map(|r| r.inserted).sum::<u64>()
        );
        assert!(sink.config.is_some());
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn delete_only_workload_leaves_the_table_empty() {
        let device = CpuDevice::new(2).unwrap();
        let config = Benchmark::builder(Backend::LinearProbing)
            .initial_capacity(512)
            .ops_per_batch(128)
            .key_range(64)
            .insert_percent(0)
            .iterations(3)
            .build()
            .unwrap();
        let generator = OperationGenerator::new(64, 0);
        assert!((0..128).all(|j| generator.operation(0, j).opcode == OpCode::Delete));

        let summary = Benchmark::new(&device, config)
            .unwrap()
            .run(&mut CollectingSink::default())
            .unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.live_keys, 0);
    }

    #[test]
    fn undersized_growth_factor_aborts_the_migration() {
        let device = CpuDevice::new(2).unwrap();
        let config = Benchmark::builder(Backend::LinearProbing)
            .initial_capacity(100)
            .resize_threshold(0.5)
            .growth_factor(0.1)
            .ops_per_batch(4)
            .key_range(1 << 40)
            .insert_percent(100)
            .iterations(20)
            .build()
            .unwrap();

        let result = Benchmark::new(&device, config)
            .unwrap()
            .run(&mut CollectingSink::default());
        assert!(matches!(
            result,
            Err(BenchError::MigrationExhausted {
                old_capacity: 100,
                new_capacity: 6,
                ..
            })
        ));
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn exhausted_inserts_are_counted_and_the_run_goes_on() {
        // Eight slots and 64 fresh keys per batch: the first batch overflows,
        // the resize before the second grows the table to one batch.
        let device = CpuDevice::new(2).unwrap();
        let config = Benchmark::builder(Backend::LinearProbing)
            .initial_capacity(8)
            .resize_threshold(1.0)
            .ops_per_batch(64)
            .insert_percent(100)
            .iterations(4)
            .build()
            .unwrap();

        let mut sink = CollectingSink::default();
        let summary = Benchmark::new(&device, config).unwrap().run(&mut sink).unwrap();

        let first = &sink.iterations[0];
        assert_eq!(first.inserted, 8);
        assert!(first.exhausted > 0);
        assert_eq!(
            summary.exhausted,
            sink.iterations.iter().map(|r| r.exhausted).sum::<u64>()
        );
        assert_eq!(summary.iterations, 4);
        assert_eq!(sink.resizes[0].old_capacity, 8);
        assert_eq!(sink.resizes[0].new_capacity, 64);
        assert_eq!(summary.live_keys, summary.inserted);
        assert_eq!(device.live_buffer_count(), 0);
    }

    /// Moves the mocked clock forward whenever a resize is reported, which
    /// happens in the middle of an iteration.
    struct AdvanceOnResize {
        mock: Arc<Mock>,
        step: Duration,
        inner: CollectingSink,
    }

    impl ResultSink for AdvanceOnResize {
        fn record_iteration(&mut self, report: &IterationReport) -> io::Result<()> {
            self.inner.record_iteration(report)
        }

        fn record_resize(&mut self, report: &ResizeReport) -> io::Result<()> {
            self.mock.increment(self.step);
            self.inner.record_resize(report)
        }
    }

    #[test]
    fn iteration_time_comes_from_the_clock() {
        let device = CpuDevice::new(1).unwrap();
        let config = Benchmark::builder(Backend::LinearProbing)
            .initial_capacity(16)
            .resize_threshold(0.5)
            .ops_per_batch(16)
            .key_range(1 << 40)
            .insert_percent(100)
            .iterations(2)
            .build()
            .unwrap();

        let (clock, mock) = Clock::mock();
        let mut bench = Benchmark::new(&device, config).unwrap();
        bench.clock = clock;
        let mut sink = AdvanceOnResize {
            mock,
            step: Duration::from_millis(5),
            inner: CollectingSink::default(),
        };

        // A mocked clock only moves when told to.
        let report = bench.run_iteration(&mut sink).unwrap();
        assert_eq!(report.elapsed, Duration::ZERO);
        assert_eq!(report.throughput, 0.0);
        assert!(sink.inner.resizes.is_empty());

        // The second iteration resizes first, and the clock moves while the
        // resize is being reported.
        let report = bench.run_iteration(&mut sink).unwrap();
        assert_eq!(sink.inner.resizes.len(), 1);
        assert_eq!(sink.inner.resizes[0].elapsed, Duration::ZERO);
        assert_eq!(report.elapsed, Duration::from_millis(5));
        assert!(report.throughput > 0.0);
        assert_eq!(sink.inner.iterations.last(), Some(&report));
    }
}
