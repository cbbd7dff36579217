// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Passive recorder of task lifecycle events. Workers append to per-worker stripes on the hot path; every derived
//! metric is computed lazily from a snapshot, in [report].

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod report;


//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::task::{
    TaskId,
    WorkerId,
};
use ::crossbeam_utils::CachePadded;
use ::std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Instant,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// One recorded task execution. Open until the executing thread records the matching end.
#[derive(Clone, Debug)]
pub struct TaskRecord {
    /// Identifier of the task.
    pub task_id: TaskId,
    /// Worker that executed the task, or None for a non-worker thread helping a join.
    pub worker: Option<WorkerId>,
    /// Worker whose deque the task was spawned onto, or None for an external submission.
    pub origin: Option<WorkerId>,
    /// Start of execution, in nanoseconds since the ledger was created.
    pub start_ns: u64,
    /// End of execution, in nanoseconds since the ledger was created. None while the task is still running.
    pub end_ns: Option<u64>,
}

/// Append-only ledger of task executions. One stripe per worker plus one for external helper threads; a stripe's
/// mutex is only ever taken by the thread the stripe belongs to and by snapshot readers, so recording does not
/// contend with other workers. The stripes are cache-line padded so neighboring workers do not false-share.
pub struct Instrumentation {
    /// Whether this ledger records anything. A disabled ledger turns both record calls into no-ops.
    enabled: bool,
    /// Number of workers this ledger was sized for.
    worker_count: usize,
    /// Cache line size the stripes were padded for. Carried for report headers.
    cache_line_size_hint: usize,
    /// Origin of the time axis.
    epoch: Instant,
    /// One stripe per worker, plus one shared by all external helper threads.
    stripes: Vec<CachePadded<Mutex<Vec<TaskRecord>>>>,
    /// Number of tasks currently running.
    running: AtomicUsize,
    /// High-water mark of [Self::running].
    high_water: AtomicUsize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TaskRecord {
    /// Checks whether this record was stolen: executed by a worker other than the one it was spawned onto.
    pub fn was_stolen(&self) -> bool {
        match (self.origin, self.worker) {
            (Some(origin), Some(worker)) => origin != worker,
            _ => false,
        }
    }
}

impl Instrumentation {
    /// Creates an enabled ledger sized for a pool of `worker_count` workers.
    pub fn new(worker_count: usize, cache_line_size_hint: usize) -> Arc<Self> {
        let stripes: Vec<CachePadded<Mutex<Vec<TaskRecord>>>> = (0..worker_count + 1)
            .map(|_| CachePadded::new(Mutex::new(Vec::new())))
            .collect();
        Arc::new(Self {
            enabled: true,
            worker_count,
            cache_line_size_hint,
            epoch: Instant::now(),
            stripes,
            running: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        })
    }

    /// Creates a ledger that records nothing.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            enabled: false,
            worker_count: 0,
            cache_line_size_hint: 0,
            epoch: Instant::now(),
            stripes: Vec::new(),
            running: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn cache_line_size_hint(&self) -> usize {
        self.cache_line_size_hint
    }

    /// Opens a record for a task that begins running on the calling thread.
    pub fn record_start(&self, task_id: TaskId, worker: Option<WorkerId>, origin: Option<WorkerId>) {
        if !self.enabled {
            return;
        }
        let start_ns: u64 = self.now_ns();
        let mut stripe: MutexGuard<Vec<TaskRecord>> = self.stripe(worker);
        stripe.push(TaskRecord {
            task_id,
            worker,
            origin,
            start_ns,
            end_ns: None,
        });
        drop(stripe);

        let running: usize = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(running, Ordering::AcqRel);
    }

    /// Closes the most recent open record for `task_id` on the calling thread's stripe. Helping joins nest task
    /// executions on one thread, so records close innermost-first.
    pub fn record_end(&self, task_id: TaskId, worker: Option<WorkerId>) {
        if !self.enabled {
            return;
        }
        let end_ns: u64 = self.now_ns();
        let mut stripe: MutexGuard<Vec<TaskRecord>> = self.stripe(worker);
        match stripe
            .iter_mut()
            .rev()
            .find(|record| record.task_id == task_id && record.end_ns.is_none())
        {
            Some(record) => record.end_ns = Some(end_ns),
            None => warn!("record_end(): no open record for task {}", task_id),
        }
        drop(stripe);

        self.running.fetch_sub(1, Ordering::AcqRel);
    }

    /// High-water mark of simultaneously running tasks.
    pub fn max_concurrency_observed(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }

    /// Copies every record out of the ledger. Best effort while tasks are still running: records without an end are
    /// included but excluded from derived metrics.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = Vec::new();
        for stripe in &self.stripes {
            let stripe: MutexGuard<Vec<TaskRecord>> = stripe.lock().unwrap_or_else(PoisonError::into_inner);
            records.extend(stripe.iter().cloned());
        }
        records
    }

    /// Stripe of the given executor. Non-worker threads share the last stripe.
    fn stripe(&self, worker: Option<WorkerId>) -> MutexGuard<Vec<TaskRecord>> {
        let index: usize = match worker {
            Some(worker) if worker.0 < self.worker_count => worker.0,
            _ => self.worker_count,
        };
        self.stripes[index].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}
