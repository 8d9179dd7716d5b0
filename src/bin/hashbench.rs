use std::{io, process::ExitCode};

use accel_hashbench::{
    bench::builder::{
        DEFAULT_GROWTH_FACTOR, DEFAULT_INITIAL_CAPACITY, DEFAULT_ITERATIONS, DEFAULT_KEY_RANGE,
        DEFAULT_OPS_PER_BATCH, DEFAULT_RESIZE_THRESHOLD,
    },
    Backend, Benchmark, CpuDevice, DeviceError, TextSink,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "hashbench",
    version,
    about = "Batch benchmark of lock-free hash tables held in device memory"
)]
struct Cli {
    /// Worker threads of the CPU device. 0 uses one per available CPU.
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    #[command(subcommand)]
    table: Table,
}

#[derive(Subcommand, Debug)]
enum Table {
    /// Flat open addressing with linear probing.
    LinearProbing(Common),
    /// Separate chaining with lists of fixed-size slabs.
    SlabList {
        /// Length of the bucket array.
        #[arg(long, default_value_t = 1_000)]
        bucket_len: usize,

        /// Words per slab: key slots plus one next pointer.
        #[arg(long, default_value_t = 16)]
        slab_size: usize,

        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// Keys the first table is sized for.
    #[arg(long, default_value_t = DEFAULT_INITIAL_CAPACITY)]
    initial_capacity: usize,

    /// Load factor that triggers a resize, in (0, 1].
    #[arg(long, default_value_t = DEFAULT_RESIZE_THRESHOLD)]
    resize_threshold: f64,

    /// New capacity as a multiple of the live key count.
    #[arg(long, default_value_t = DEFAULT_GROWTH_FACTOR)]
    growth_factor: f64,

    /// Keys are drawn from [1, key-range).
    #[arg(long, default_value_t = DEFAULT_KEY_RANGE)]
    key_range: u64,

    #[arg(long, default_value_t = DEFAULT_OPS_PER_BATCH)]
    ops_per_batch: u32,

    /// Number of batches.
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,

    /// Share of inserts among the operations, in percent.
    #[arg(long, default_value_t = 50)]
    insert_percent: u8,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let device = match CpuDevice::new(cli.threads) {
        Ok(device) => device,
        Err(e @ DeviceError::Unavailable(_)) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("failed to set up the device: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&device, cli.table) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(device: &CpuDevice, table: Table) -> anyhow::Result<()> {
    let (backend, common) = match table {
        Table::LinearProbing(common) => (Backend::LinearProbing, common),
        Table::SlabList {
            bucket_len,
            slab_size,
            common,
        } => (Backend::slab_list(bucket_len, slab_size), common),
    };

    let config = Benchmark::builder(backend)
        .initial_capacity(common.initial_capacity)
        .resize_threshold(common.resize_threshold)
        .growth_factor(common.growth_factor)
        .key_range(common.key_range)
        .ops_per_batch(common.ops_per_batch)
        .iterations(common.iterations)
        .insert_percent(common.insert_percent)
        .build()
        .context("invalid benchmark configuration")?;

    let mut sink = TextSink::new(io::stdout().lock());
    let summary = Benchmark::new(device, config)?.run(&mut sink)?;
    log::info!(
        "{} live keys after {} resize(s), final capacity {}",
        summary.live_keys,
        summary.resizes,
        summary.final_capacity
    );
    Ok(())
}
