// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::forkpool::{
    ensure_eq,
    Instrumentation,
    Priority,
    Report,
    Schedule,
    TaskState,
    WorkerPool,
};
use ::std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    thread,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of workers used by the multi-worker scenarios.
const WORKERS: usize = 4;

/// Number of independent tasks in the load scenarios.
const TASKS: usize = 100;

//======================================================================================================================
// test_independent_tasks_all_complete()
//======================================================================================================================

/// Submits 100 independent tasks to a 4-worker pool: all must complete, each result must be intact, and the ledger
/// loads must add up to exactly 100 executions.
#[test]
fn test_independent_tasks_all_complete() -> Result<()> {
    let instrument: Arc<Instrumentation> = Instrumentation::new(WORKERS, 64);
    let pool: WorkerPool = WorkerPool::builder()
        .worker_count(WORKERS)
        .instrumentation(instrument.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build pool: {:?}", e))?;
    let scheduler = pool.scheduler();

    // Each task owns its counter; there is no shared mutable state between them.
    let mut handles = Vec::with_capacity(TASKS);
    for index in 0..TASKS {
        handles.push(scheduler.spawn(move || {
            let mut counter: usize = 0;
            counter += index + 1;
            counter
        })?);
    }

    let results: Vec<usize> = scheduler.join_all(handles)?;
    ensure_eq!(results.len(), TASKS);
    for (index, result) in results.iter().enumerate() {
        ensure_eq!(*result, index + 1);
    }

    pool.shutdown()?;
    let report: Report = Report::new(&instrument);
    ensure_eq!(report.completions(), TASKS);
    let executed: usize = report.per_worker_load().iter().map(|load| load.tasks).sum();
    ensure_eq!(executed, TASKS);
    ensure_eq!(report.stolen_ratio() >= 0.0, true);
    Ok(())
}

//======================================================================================================================
// test_join_all_is_terminal_for_every_handle()
//======================================================================================================================

/// After join_all returns, every referenced handle must be in a terminal state, even when one task failed; the
/// first failure in handle order is the one reported.
#[test]
fn test_join_all_is_terminal_for_every_handle() -> Result<()> {
    let pool: WorkerPool = WorkerPool::builder().worker_count(WORKERS).build()?;
    let scheduler = pool.scheduler();

    let mut handles = Vec::new();
    for index in 0..16u64 {
        handles.push(scheduler.spawn(move || {
            if index == 5 {
                panic!("task five fails");
            }
            thread::sleep(Duration::from_millis(1));
            index
        })?);
    }
    let watchers: Vec<_> = handles.clone();

    let Err(fail) = scheduler.join_all(handles) else {
        anyhow::bail!("the failure should surface")
    };
    ensure_eq!(fail.errno, libc::ECANCELED);
    ensure_eq!(fail.cause.contains("task five fails"), true);

    // Join completeness: no handle is left pending or running.
    for (index, watcher) in watchers.iter().enumerate() {
        let expected: TaskState = if index == 5 { TaskState::Failed } else { TaskState::Completed };
        ensure_eq!(watcher.state(), expected);
    }

    pool.shutdown()?;
    Ok(())
}

//======================================================================================================================
// test_panic_isolation()
//======================================================================================================================

/// A panicking task body must not take down its worker: the pool keeps executing unrelated work afterwards.
#[test]
fn test_panic_isolation() -> Result<()> {
    let pool: WorkerPool = WorkerPool::builder().worker_count(1).build()?;
    let scheduler = pool.scheduler();

    for round in 0..8u64 {
        let victim = scheduler.spawn(move || -> u64 { panic!("round {} panics", round) })?;
        let survivor = scheduler.spawn(move || round * 2)?;

        let Err(fail) = scheduler.join(&victim) else {
            anyhow::bail!("the panic should be captured")
        };
        ensure_eq!(fail.errno, libc::ECANCELED);
        ensure_eq!(scheduler.join(&survivor)?, round * 2);
    }

    pool.shutdown()?;
    Ok(())
}

//======================================================================================================================
// test_submit_after_shutdown_is_rejected()
//======================================================================================================================

/// Submissions after shutdown has begun are rejected with ESHUTDOWN, never silently dropped; shutting down again
/// is a no-op.
#[test]
fn test_submit_after_shutdown_is_rejected() -> Result<()> {
    let pool: WorkerPool = WorkerPool::builder().worker_count(2).build()?;
    let scheduler = pool.scheduler();

    let handle = scheduler.spawn(|| 1u64)?;
    ensure_eq!(scheduler.join(&handle)?, 1);
    pool.shutdown()?;

    let Err(fail) = scheduler.spawn(|| 2u64) else {
        anyhow::bail!("the submission should be rejected")
    };
    ensure_eq!(fail.errno, libc::ESHUTDOWN);
    let Err(fail) = pool.submit(|| 3u64) else {
        anyhow::bail!("the submission should be rejected")
    };
    ensure_eq!(fail.errno, libc::ESHUTDOWN);

    pool.shutdown()?;
    Ok(())
}

//======================================================================================================================
// test_work_is_conserved_and_stolen()
//======================================================================================================================

/// Children spawned from inside one task land on that worker's deque; with more tasks than workers and siblings
/// idling, stealing must spread the load. Verifiable through the ledger: every execution is recorded and at least
/// one record ran on a worker other than its origin. The test thread must not help while the children run, or the
/// root would execute without a worker context and its children would carry no originating worker; it waits for the
/// root to be running on a worker, then polls until everything is terminal, and only then joins.
#[test]
fn test_work_is_conserved_and_stolen() -> Result<()> {
    const CHILDREN: usize = 32;

    let instrument: Arc<Instrumentation> = Instrumentation::new(WORKERS, 64);
    let pool: WorkerPool = WorkerPool::builder()
        .worker_count(WORKERS)
        .instrumentation(instrument.clone())
        .build()?;
    let scheduler = pool.scheduler();

    let spawner = scheduler.clone();
    let root = scheduler.spawn(move || -> Result<usize, ::forkpool::Fail> {
        let mut handles = Vec::with_capacity(CHILDREN);
        for _ in 0..CHILDREN {
            handles.push(spawner.spawn(|| {
                // Enough work that idle siblings wake up and steal.
                thread::sleep(Duration::from_millis(2));
                1usize
            })?);
        }
        Ok(spawner.join_all(handles)?.into_iter().sum())
    })?;

    // A worker has dequeued the root once it leaves Pending; every child spawned after that carries that worker as
    // its origin.
    let mut spins: usize = 0;
    while root.state() == TaskState::Pending {
        thread::sleep(Duration::from_millis(1));
        spins += 1;
        if spins > 5_000 {
            anyhow::bail!("the root task was never dequeued");
        }
    }
    while !root.is_finished() {
        thread::sleep(Duration::from_millis(1));
        spins += 1;
        if spins > 5_000 {
            anyhow::bail!("the root task did not finish in time");
        }
    }

    let total: usize = scheduler.join(&root)??;
    ensure_eq!(total, CHILDREN);
    pool.shutdown()?;

    let report: Report = Report::new(&instrument);
    ensure_eq!(report.completions(), CHILDREN + 1);
    ensure_eq!(report.stolen_ratio() > 0.0, true);
    Ok(())
}

//======================================================================================================================
// test_join_all_children_from_inside_a_task()
//======================================================================================================================

/// A task that spawns children and calls join_all_children observes all of their side effects afterwards.
#[test]
fn test_join_all_children_from_inside_a_task() -> Result<()> {
    let pool: WorkerPool = WorkerPool::builder().worker_count(WORKERS).build()?;
    let scheduler = pool.scheduler();

    let counter: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let spawner = scheduler.clone();
    let observed: Arc<AtomicUsize> = counter.clone();
    let root = scheduler.spawn(move || -> Result<usize, ::forkpool::Fail> {
        for _ in 0..24 {
            let counter: Arc<AtomicUsize> = observed.clone();
            spawner.spawn(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            })?;
        }
        spawner.join_all_children()?;
        // The join establishes happens-before: every child increment is visible here.
        Ok(observed.load(Ordering::Acquire))
    })?;

    ensure_eq!(scheduler.join(&root)??, 24);
    pool.shutdown()?;
    Ok(())
}

//======================================================================================================================
// test_external_joiner_helps_a_single_worker_pool()
//======================================================================================================================

/// On a single-worker pool, an external caller blocked in join must execute pending tasks itself rather than wait
/// for the lone worker to get to them.
#[test]
fn test_external_joiner_helps_a_single_worker_pool() -> Result<()> {
    let instrument: Arc<Instrumentation> = Instrumentation::new(1, 64);
    let pool: WorkerPool = WorkerPool::builder()
        .worker_count(1)
        .instrumentation(instrument.clone())
        .build()?;
    let scheduler = pool.scheduler();

    // Keep the lone worker busy while the backlog piles up in the injector.
    let blocker = scheduler.spawn_with_priority(Priority::High, || {
        thread::sleep(Duration::from_millis(50));
    })?;
    let mut handles = Vec::new();
    for index in 0..50usize {
        handles.push(scheduler.spawn(move || index)?);
    }

    let results: Vec<usize> = scheduler.join_all(handles)?;
    ensure_eq!(results.len(), 50);
    scheduler.join(&blocker)?;
    pool.shutdown()?;

    // Some of the backlog must have run on the joining thread, which has no worker id.
    let helped: usize = Report::new(&instrument)
        .per_worker_load()
        .iter()
        .filter(|load| load.worker.is_none())
        .map(|load| load.tasks)
        .sum();
    ensure_eq!(helped > 0, true);
    Ok(())
}

//======================================================================================================================
// test_recursive_cutoff_is_cutoff_invariant()
//======================================================================================================================

/// The recursive sum of 0..N must be identical for a fully sequential cutoff, a balanced cutoff, and a fully
/// parallel cutoff of one element per task.
#[test]
fn test_recursive_cutoff_is_cutoff_invariant() -> Result<()> {
    const N: usize = 4_096;
    let expected: u64 = (N as u64 - 1) * N as u64 / 2;

    let pool: WorkerPool = WorkerPool::builder().worker_count(WORKERS).build()?;
    let scheduler = pool.scheduler();
    for cutoff in [1, 64, N, 2 * N] {
        let sum: u64 = scheduler.recursive_cutoff(
            N,
            cutoff,
            |range| range.map(|i| i as u64).sum::<u64>(),
            |left, right| left + right,
        )?;
        ensure_eq!(sum, expected);
    }
    pool.shutdown()?;
    Ok(())
}

//======================================================================================================================
// test_priority_lane_is_drained_first()
//======================================================================================================================

/// High-priority submissions are taken from the global queue ahead of normal ones. Observed through a single-worker
/// pool with the worker initially pinned down.
#[test]
fn test_priority_lane_is_drained_first() -> Result<()> {
    let pool: WorkerPool = WorkerPool::builder().worker_count(1).build()?;
    let scheduler = pool.scheduler();
    let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

    // Pin the worker so both lanes are populated before anything is dequeued.
    let pin = scheduler.spawn_with_priority(Priority::High, || {
        thread::sleep(Duration::from_millis(20));
    })?;
    let normal = {
        let order = order.clone();
        scheduler.spawn(move || order.lock().unwrap().push("normal"))?
    };
    let high = {
        let order = order.clone();
        scheduler.spawn_with_priority(Priority::High, move || order.lock().unwrap().push("high"))?
    };

    // Wait without helping, otherwise this thread would drain the queues itself.
    while !(pin.is_finished() && normal.is_finished() && high.is_finished()) {
        thread::sleep(Duration::from_millis(1));
    }
    pool.shutdown()?;
    ensure_eq!(order.lock().unwrap().clone(), vec!["high", "normal"]);
    Ok(())
}
