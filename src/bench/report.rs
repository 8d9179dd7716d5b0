//! Where benchmark results go.

use std::{io, time::Duration};

use super::builder::BenchConfig;
use crate::generation::TableLayout;

/// The results of one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationReport {
    /// Zero-based.
    pub iteration: u32,
    /// Time for the batch, including a resize that ran before it.
    pub elapsed: Duration,
    pub inserted: u64,
    pub deleted: u64,
    pub exhausted: u64,
    /// Operations per second.
    pub throughput: f64,
}

/// The results of one resize.
#[derive(Clone, Debug, PartialEq)]
pub struct ResizeReport {
    /// The iteration the resize ran before. Zero-based.
    pub iteration: u32,
    pub old_capacity: usize,
    pub new_capacity: usize,
    pub new_layout: TableLayout,
    /// Keys re-inserted into the new table.
    pub migrated: u64,
    pub elapsed: Duration,
}

/// Receives the results of a benchmark run as they are produced.
pub trait ResultSink {
    fn record_config(&mut self, _config: &BenchConfig) -> io::Result<()> {
        Ok(())
    }

    fn record_iteration(&mut self, _report: &IterationReport) -> io::Result<()> {
        Ok(())
    }

    fn record_resize(&mut self, _report: &ResizeReport) -> io::Result<()> {
        Ok(())
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1_000.0
}

/// Writes results as plain text lines.
pub struct TextSink<W> {
    out: W,
}

impl<W: io::Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> ResultSink for TextSink<W> {
    fn record_config(&mut self, config: &BenchConfig) -> io::Result<()> {
        let out = &mut self.out;
        writeln!(out, "Configurations:")?;
        writeln!(out, "\tBACKEND={}", config.backend())?;
        writeln!(out, "\tINITIAL_CAPACITY={}", config.initial_capacity())?;
        if let TableLayout::SlabList {
            bucket_len,
            slab_size,
            ..
        } = config.initial_layout()
        {
            writeln!(out, "\tHASH_TABLE_LENGTH={bucket_len}")?;
            writeln!(out, "\tSLAB_SIZE={slab_size}")?;
        }
        writeln!(out, "\tRESIZE_THRESHOLD={}", config.resize_threshold())?;
        writeln!(out, "\tOPS_PER_BATCH={}", config.ops_per_batch())?;
        writeln!(out, "\tITERATIONS={}", config.iterations())?;
        writeln!(out, "\tKEY_RANGE={}", config.key_range())?;
        writeln!(out, "\tNEW_SIZE_FACTOR={}", config.growth_factor())?;
        writeln!(out, "\tINSERT_PERCENT={}", config.insert_percent())?;
        if let TableLayout::SlabList { block_size, .. } = config.initial_layout() {
            writeln!(out, "\tBLOCK_SIZE={block_size}")?;
        }
        Ok(())
    }

    fn record_iteration(&mut self, report: &IterationReport) -> io::Result<()> {
        write!(
            self.out,
            "Iteration {}:\t{:.2}ms\t{} keys inserted,\t{} keys deleted,",
            report.iteration + 1,
            millis(report.elapsed),
            report.inserted,
            report.deleted,
        )?;
        if report.exhausted > 0 {
            write!(self.out, "\t{} inserts exhausted,", report.exhausted)?;
        }
        writeln!(self.out, "\tthroughput {:.0} ops/s.", report.throughput)
    }

    fn record_resize(&mut self, report: &ResizeReport) -> io::Result<()> {
        write!(
            self.out,
            "Iteration {}:\tresize completed in {:.2} ms. Old capacity: {},\tnew capacity: {}",
            report.iteration + 1,
            millis(report.elapsed),
            report.old_capacity,
            report.new_capacity,
        )?;
        if let TableLayout::SlabList {
            bucket_len,
            block_size,
            ..
        } = report.new_layout
        {
            write!(
                self.out,
                ",\tnew hash table length: {bucket_len},\tnew block size: {block_size}"
            )?;
        }
        writeln!(self.out, ".")
    }
}

/// Sends results to the `log` facade at `info` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn record_config(&mut self, config: &BenchConfig) -> io::Result<()> {
        log::info!("benchmark configuration: {config:?}");
        Ok(())
    }

    fn record_iteration(&mut self, report: &IterationReport) -> io::Result<()> {
        log::info!(
            "iteration {}: {:.2} ms, {} inserted, {} deleted, {} exhausted, {:.0} ops/s",
            report.iteration + 1,
            millis(report.elapsed),
            report.inserted,
            report.deleted,
            report.exhausted,
            report.throughput
        );
        Ok(())
    }

    fn record_resize(&mut self, report: &ResizeReport) -> io::Result<()> {
        log::info!(
            "iteration {}: resized from {} to {} in {:.2} ms, {} keys migrated",
            report.iteration + 1,
            report.old_capacity,
            report.new_capacity,
            millis(report.elapsed),
            report.migrated
        );
        Ok(())
    }
}

/// Keeps every result in memory.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    pub config: Option<BenchConfig>,
    pub iterations: Vec<IterationReport>,
    pub resizes: Vec<ResizeReport>,
}

impl ResultSink for CollectingSink {
    fn record_config(&mut self, config: &BenchConfig) -> io::Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn record_iteration(&mut self, report: &IterationReport) -> io::Result<()> {
        self.iterations.push(report.clone());
        Ok(())
    }

    fn record_resize(&mut self, report: &ResizeReport) -> io::Result<()> {
        self.resizes.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{IterationReport, ResizeReport, ResultSink, TextSink};
    use crate::{
        bench::builder::{Backend, BenchmarkBuilder},
        generation::TableLayout,
    };
    use std::time::Duration;

    fn text(record: impl FnOnce(&mut TextSink<Vec<u8>>)) -> String {
        let mut sink = TextSink::new(Vec::new());
        record(&mut sink);
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn iteration_line() {
        let report = IterationReport {
            iteration: 0,
            elapsed: Duration::from_micros(1_500),
            inserted: 120,
            deleted: 30,
            exhausted: 0,
            throughput: 170_666.6,
        };
        assert_eq!(
            text(|s| s.record_iteration(&report).unwrap()),
            "Iteration 1:\t1.50ms\t120 keys inserted,\t30 keys deleted,\tthroughput 170667 ops/s.\n"
        );

        let report = IterationReport {
            exhausted: 4,
            ..report
        };
        assert!(text(|s| s.record_iteration(&report).unwrap())
            .contains("\t4 inserts exhausted,\tthroughput"));
    }

    #[test]
    fn resize_line() {
        let report = ResizeReport {
            iteration: 3,
            old_capacity: 1_000,
            new_capacity: 1_536,
            new_layout: TableLayout::slab_list(1_536, 154, 8).unwrap(),
            migrated: 768,
            elapsed: Duration::from_millis(2),
        };
        let line = text(|s| s.record_resize(&report).unwrap());
        assert!(line.starts_with(
            "Iteration 4:\tresize completed in 2.00 ms. Old capacity: 1000,\tnew capacity: 1536"
        ));
        assert!(line.contains(",\tnew hash table length: 154,\tnew block size: "));
        assert!(line.ends_with(".\n"));
    }

    #[test]
    fn config_echo_includes_the_block_size() {
        let config = BenchmarkBuilder::new(Backend::slab_list(10, 4))
            .initial_capacity(30)
            .build()
            .unwrap();
        let echo = text(|s| s.record_config(&config).unwrap());
        assert!(echo.starts_with("Configurations:\n\tBACKEND=slab list\n"));
        assert!(echo.contains("\tHASH_TABLE_LENGTH=10\n\tSLAB_SIZE=4\n"));
        // 30 keys at 3 per slab, 10 bucket slabs and the padding slab.
        assert!(echo.ends_with("\tBLOCK_SIZE=84\n"));

        let config = BenchmarkBuilder::new(Backend::LinearProbing).build().unwrap();
        let echo = text(|s| s.record_config(&config).unwrap());
        assert!(!echo.contains("BLOCK_SIZE"));
    }
}
