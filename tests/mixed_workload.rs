//! Inserts and deletes of the same key race within a batch, so the live set
//! of a mixed run is not deterministic. What must hold regardless of
//! scheduling is checked here.

use std::collections::HashSet;

use accel_hashbench::{Backend, Benchmark, CollectingSink, CpuDevice, RunSummary, TextSink};

fn run(backend: Backend, insert_percent: u8) -> anyhow::Result<(RunSummary, CollectingSink)> {
    let _ = env_logger::try_init();

    let device = CpuDevice::new(0)?;
    let config = Benchmark::builder(backend)
        .initial_capacity(4_000)
        .ops_per_batch(1_000)
        .key_range(20_000)
        .insert_percent(insert_percent)
        .iterations(24)
        .build()?;

    let mut sink = CollectingSink::default();
    let summary = Benchmark::new(&device, config)?.run(&mut sink)?;
    assert_eq!(device.live_buffer_count(), 0);
    Ok((summary, sink))
}

fn check(summary: &RunSummary, sink: &CollectingSink) {
    assert_eq!(summary.iterations, 24);
    assert_eq!(summary.exhausted, 0);
    assert_eq!(summary.live_keys, summary.inserted - summary.deleted);
    assert_eq!(
        summary.deleted,
        sink.iterations.iter().map(|r| r.deleted).sum::<u64>()
    );
    assert_eq!(summary.resizes as usize, sink.resizes.len());
    if let Some(last) = sink.resizes.last() {
        assert_eq!(summary.final_capacity, last.new_capacity);
    }
}

#[test]
fn linear_probing_counts_match_the_table() -> anyhow::Result<()> {
    let (summary, sink) = run(Backend::LinearProbing, 50)?;
    check(&summary, &sink);
    Ok(())
}

#[test]
fn slab_list_counts_match_the_table() -> anyhow::Result<()> {
    let (summary, sink) = run(Backend::slab_list(256, 16), 50)?;
    check(&summary, &sink);
    Ok(())
}

#[test]
fn insert_heavy_runs_resize_repeatedly() -> anyhow::Result<()> {
    for backend in [Backend::LinearProbing, Backend::slab_list(64, 4)] {
        let (summary, sink) = run(backend, 80)?;
        check(&summary, &sink);
        assert!(summary.resizes >= 2, "{backend}: {summary:?}");

        for resize in &sink.resizes {
            // Never below one batch, and twice the migrated keys otherwise.
            assert!(resize.new_capacity >= 1_000);
            assert!(resize.new_capacity as u64 >= 2 * resize.migrated);
        }
    }
    Ok(())
}

#[test]
fn live_keys_are_unique_mid_run() -> anyhow::Result<()> {
    let device = CpuDevice::new(8)?;
    let config = Benchmark::builder(Backend::slab_list(32, 3))
        .initial_capacity(3_000)
        .ops_per_batch(800)
        .key_range(2_000)
        .iterations(10)
        .build()?;

    let mut sink = TextSink::new(Vec::new());
    let mut bench = Benchmark::new(&device, config)?;
    for _ in 0..10 {
        bench.run_iteration(&mut sink)?;
        let live = bench.live_keys()?;
        let unique: HashSet<_> = live.iter().copied().collect();
        assert_eq!(live.len(), unique.len());
        assert!(unique.iter().all(|&k| (1..2_000).contains(&k)));
    }

    let output = String::from_utf8(sink.into_inner())?;
    assert_eq!(output.lines().filter(|l| l.contains("keys inserted")).count(), 10);
    Ok(())
}
