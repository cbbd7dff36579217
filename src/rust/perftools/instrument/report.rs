// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    perftools::instrument::{
        Instrumentation,
        TaskRecord,
    },
    runtime::{
        fail::Fail,
        scheduler::task::WorkerId,
    },
};
use ::histogram::Histogram;
use ::std::io;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Grouping power of the duration histogram. Seven keeps the relative error of a bucket below one percent.
const HISTOGRAM_GROUPING_POWER: u8 = 7;

/// Highest representable duration in the histogram, as a power of two in nanoseconds. Sixty-two covers two minutes.
const HISTOGRAM_MAX_VALUE_POWER: u8 = 62;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Tasks executed and time spent by one executor. The entry with no worker aggregates every non-worker thread that
/// ran tasks while helping a join.
#[derive(Clone, Debug)]
pub struct WorkerLoad {
    pub worker: Option<WorkerId>,
    pub tasks: usize,
    pub busy_ns: u64,
}

/// Task duration distribution.
#[derive(Clone, Copy, Debug)]
pub struct DurationPercentiles {
    pub p50_ns: u64,
    pub p90_ns: u64,
    pub p99_ns: u64,
}

/// Immutable view over one snapshot of a ledger. Derivations only consider closed records; a report taken while
/// tasks are still running is a documented best-effort view.
pub struct Report {
    worker_count: usize,
    cache_line_size_hint: usize,
    max_concurrency: usize,
    records: Vec<TaskRecord>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Report {
    /// Snapshots `instrument` into a report.
    pub fn new(instrument: &Instrumentation) -> Self {
        Self {
            worker_count: instrument.worker_count(),
            cache_line_size_hint: instrument.cache_line_size_hint(),
            max_concurrency: instrument.max_concurrency_observed(),
            records: instrument.snapshot(),
        }
    }

    /// Cache line size the ledger stripes were padded for, echoed in the CSV header for offline false-sharing
    /// analysis.
    pub fn cache_line_size_hint(&self) -> usize {
        self.cache_line_size_hint
    }

    /// Number of records in the snapshot, open ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of closed records in the snapshot.
    pub fn completions(&self) -> usize {
        self.closed().count()
    }

    /// Fraction of worker-originated tasks that were executed by a worker other than the one they were spawned onto.
    /// External submissions have no originating worker and do not count either way.
    pub fn stolen_ratio(&self) -> f64 {
        let mut owned: usize = 0;
        let mut stolen: usize = 0;
        for record in self.closed().filter(|record| record.origin.is_some()) {
            if record.was_stolen() {
                stolen += 1;
            } else {
                owned += 1;
            }
        }
        let total: usize = owned + stolen;
        if total == 0 {
            return 0.0;
        }
        stolen as f64 / total as f64
    }

    /// Tasks executed and busy time per worker, with non-worker helper threads aggregated in a final entry.
    pub fn per_worker_load(&self) -> Vec<WorkerLoad> {
        let mut loads: Vec<WorkerLoad> = (0..self.worker_count)
            .map(|index| WorkerLoad {
                worker: Some(WorkerId(index)),
                tasks: 0,
                busy_ns: 0,
            })
            .collect();
        loads.push(WorkerLoad {
            worker: None,
            tasks: 0,
            busy_ns: 0,
        });

        for record in self.closed() {
            let index: usize = match record.worker {
                Some(worker) if worker.0 < self.worker_count => worker.0,
                _ => self.worker_count,
            };
            loads[index].tasks += 1;
            loads[index].busy_ns += record.end_ns.unwrap_or(record.start_ns) - record.start_ns;
        }
        loads
    }

    /// Completions per equal-width time bucket, spanning the first recorded start to the last recorded end.
    pub fn throughput(&self, n_buckets: usize) -> Vec<usize> {
        if n_buckets == 0 {
            return Vec::new();
        }
        let mut buckets: Vec<usize> = vec![0; n_buckets];

        let first_start: Option<u64> = self.closed().map(|record| record.start_ns).min();
        let last_end: Option<u64> = self.closed().filter_map(|record| record.end_ns).max();
        let (first_start, last_end): (u64, u64) = match (first_start, last_end) {
            (Some(first_start), Some(last_end)) => (first_start, last_end),
            _ => return buckets,
        };

        let span: u64 = (last_end - first_start).max(1);
        for record in self.closed() {
            let end_ns: u64 = record.end_ns.unwrap_or(record.start_ns);
            let index: usize = ((end_ns - first_start) as u128 * n_buckets as u128 / span as u128) as usize;
            buckets[index.min(n_buckets - 1)] += 1;
        }
        buckets
    }

    /// High-water mark of simultaneously running tasks at snapshot time.
    pub fn max_concurrency_observed(&self) -> usize {
        self.max_concurrency
    }

    /// Task duration distribution over the closed records. None when there is nothing to aggregate; histogram
    /// failures are downgraded to a warning, never surfaced as an error.
    pub fn duration_percentiles(&self) -> Option<DurationPercentiles> {
        let mut histogram: Histogram = match Histogram::new(HISTOGRAM_GROUPING_POWER, HISTOGRAM_MAX_VALUE_POWER) {
            Ok(histogram) => histogram,
            Err(e) => {
                warn!("duration_percentiles(): failed to build histogram ({:?})", e);
                return None;
            },
        };

        let mut samples: usize = 0;
        for record in self.closed() {
            let duration_ns: u64 = record.end_ns.unwrap_or(record.start_ns) - record.start_ns;
            if let Err(e) = histogram.increment(duration_ns) {
                warn!("duration_percentiles(): failed to record sample ({:?})", e);
                continue;
            }
            samples += 1;
        }
        if samples == 0 {
            return None;
        }

        let percentile = |p: f64| -> Option<u64> {
            match histogram.percentile(p) {
                Ok(Some(bucket)) => Some(bucket.end()),
                Ok(None) => None,
                Err(e) => {
                    warn!("duration_percentiles(): failed to compute p{} ({:?})", p, e);
                    None
                },
            }
        };
        Some(DurationPercentiles {
            p50_ns: percentile(50.0)?,
            p90_ns: percentile(90.0)?,
            p99_ns: percentile(99.0)?,
        })
    }

    /// Writes the snapshot as CSV, one row per record. I/O failures map to EIO and leave scheduling untouched; the
    /// caller decides whether to downgrade them to a warning.
    pub fn write_csv<W: io::Write>(&self, out: &mut W) -> Result<(), Fail> {
        writeln!(
            out,
            "# workers={} cache_line_size_hint={} max_concurrency={}",
            self.worker_count, self.cache_line_size_hint, self.max_concurrency
        )?;
        writeln!(out, "task_id,worker,origin,start_ns,end_ns")?;
        for record in &self.records {
            writeln!(
                out,
                "{},{},{},{},{}",
                record.task_id,
                format_worker(record.worker),
                format_worker(record.origin),
                record.start_ns,
                record.end_ns.map(|ns| ns.to_string()).unwrap_or_default(),
            )?;
        }
        Ok(())
    }

    fn closed(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter().filter(|record| record.end_ns.is_some())
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn format_worker(worker: Option<WorkerId>) -> String {
    match worker {
        Some(worker) => worker.to_string(),
        None => "external".to_string(),
    }
}
