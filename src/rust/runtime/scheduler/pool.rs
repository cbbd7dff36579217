// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    perftools::instrument::Instrumentation,
    runtime::{
        config::{
            Config,
            StealStrategy,
        },
        context,
        fail::Fail,
        limits,
        logging,
        scheduler::{
            handle::TaskHandle,
            queue::InjectorQueue,
            scheduler::Scheduler,
            scope::JoinScope,
            task::{
                Priority,
                Task,
                TaskId,
                WorkerId,
            },
            worker::{
                self,
                WorkerCore,
            },
        },
    },
};
use ::crossbeam_deque::{
    Steal,
    Stealer,
    Worker as LocalDeque,
};
use ::std::{
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    thread,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Gate that idle workers park on. Wakeups bump an epoch under the lock, so a parked worker never misses a wakeup
/// that races its own park; parks are timed anyway so the gate never needs exact bookkeeping.
pub struct IdleGate {
    epoch: Mutex<u64>,
    wakeup: Condvar,
}

/// State shared by every worker of a pool and by every handle onto the pool.
pub struct PoolShared {
    /// Number of worker threads.
    worker_count: usize,
    /// Victim selection order for stealing.
    steal_strategy: StealStrategy,
    /// Cutoff used by divide-and-conquer drivers when the caller passes zero.
    cutoff_default: usize,
    /// Global entry queue.
    injectors: InjectorQueue,
    /// Stealing ends of all worker deques, indexed by worker.
    stealers: Vec<Stealer<Task>>,
    /// Gate idle workers park on.
    gate: IdleGate,
    /// Set once shutdown begins. No submissions are accepted from that point on.
    shutting_down: AtomicBool,
    /// Number of accepted tasks that have not finished running yet.
    inflight: AtomicUsize,
    /// Allocator for task identifiers.
    next_task_id: AtomicU64,
    /// Scope that submissions from outside any task attach to.
    root_scope: Arc<JoinScope>,
    /// Ledger that workers record task execution into.
    instrument: Arc<Instrumentation>,
}

/// Builder for [WorkerPool]. All knobs default to the values documented in the configuration section.
pub struct PoolBuilder {
    worker_count: Option<usize>,
    cutoff_default: usize,
    steal_strategy: StealStrategy,
    cache_line_size_hint: usize,
    instrument: Option<Arc<Instrumentation>>,
}

/// A fixed pool of worker threads executing tasks with work stealing. Dropping the pool drains and joins it.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl IdleGate {
    fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            wakeup: Condvar::new(),
        }
    }

    /// Parks the calling thread until a wakeup or the timeout, whichever comes first.
    pub fn park_timeout(&self, timeout: Duration) {
        let epoch: MutexGuard<u64> = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        let before: u64 = *epoch;
        let _ = self
            .wakeup
            .wait_timeout_while(epoch, timeout, |current| *current == before)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Wakes one parked thread.
    pub fn wake_one(&self) {
        self.bump();
        self.wakeup.notify_one();
    }

    /// Wakes every parked thread.
    pub fn wake_all(&self) {
        self.bump();
        self.wakeup.notify_all();
    }

    fn bump(&self) {
        let mut epoch: MutexGuard<u64> = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch = epoch.wrapping_add(1);
    }
}

impl PoolShared {
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn steal_strategy(&self) -> StealStrategy {
        self.steal_strategy
    }

    pub fn cutoff_default(&self) -> usize {
        self.cutoff_default
    }

    pub fn injectors(&self) -> &InjectorQueue {
        &self.injectors
    }

    pub fn stealers(&self) -> &[Stealer<Task>] {
        &self.stealers
    }

    pub fn gate(&self) -> &IdleGate {
        &self.gate
    }

    pub fn root_scope(&self) -> &Arc<JoinScope> {
        &self.root_scope
    }

    pub fn instrument(&self) -> &Arc<Instrumentation> {
        &self.instrument
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Checks whether shutdown began and every accepted task has finished. Workers exit on this condition.
    pub fn is_drained(&self) -> bool {
        self.is_shutting_down() && self.inflight.load(Ordering::Acquire) == 0
    }

    /// Retires one accepted task. The last retirement during a shutdown wakes all workers so they can exit.
    pub fn task_retired(&self) {
        let before: usize = self.inflight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(before > 0);
        if before == 1 && self.is_shutting_down() {
            self.gate.wake_all();
        }
    }

    /// Steals one task for a thread that has no deque of its own: a non-worker caller helping a join.
    pub fn steal_for_external(&self) -> Option<Task> {
        if let Some(task) = self.injectors.steal() {
            return Some(task);
        }
        for _ in 0..limits::MAX_STEAL_RETRIES {
            let mut contended: bool = false;
            for stealer in &self.stealers {
                match stealer.steal() {
                    Steal::Success(task) => return Some(task),
                    Steal::Retry => contended = true,
                    Steal::Empty => (),
                }
            }
            if !contended {
                break;
            }
        }
        None
    }

    fn allocate_task_id(&self) -> TaskId {
        TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            worker_count: None,
            cutoff_default: limits::DEFAULT_CUTOFF,
            steal_strategy: StealStrategy::RoundRobin,
            cache_line_size_hint: limits::DEFAULT_CACHE_LINE_SIZE,
            instrument: None,
        }
    }

    /// Sets the number of worker threads. Defaults to the hardware concurrency of the host.
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = Some(worker_count);
        self
    }

    /// Sets the cutoff used by divide-and-conquer drivers when the caller passes zero.
    pub fn cutoff_default(mut self, cutoff: usize) -> Self {
        self.cutoff_default = cutoff;
        self
    }

    /// Sets the victim selection order used when stealing.
    pub fn steal_strategy(mut self, strategy: StealStrategy) -> Self {
        self.steal_strategy = strategy;
        self
    }

    /// Sets the cache line size hint carried by the instrumentation ledger.
    pub fn cache_line_size_hint(mut self, hint: usize) -> Self {
        self.cache_line_size_hint = hint;
        self
    }

    /// Attaches an instrumentation ledger. Defaults to a disabled ledger that records nothing.
    pub fn instrumentation(mut self, instrument: Arc<Instrumentation>) -> Self {
        self.instrument = Some(instrument);
        self
    }

    /// Reads every knob from a configuration object.
    pub fn from_config(mut self, config: &Config) -> Result<Self, Fail> {
        self.worker_count = Some(config.worker_count()?);
        self.cutoff_default = config.cutoff_default()?;
        self.steal_strategy = config.steal_strategy()?;
        self.cache_line_size_hint = config.cache_line_size_hint()?;
        Ok(self)
    }

    /// Validates the knobs, spawns the workers, and hands back the running pool.
    pub fn build(self) -> Result<WorkerPool, Fail> {
        logging::initialize();

        let worker_count: usize = match self.worker_count {
            Some(count) => count,
            None => Config::default_worker_count(),
        };
        if worker_count == 0 {
            let cause: &str = "worker_count must be at least one";
            error!("build(): {}", cause);
            return Err(Fail::new(libc::EINVAL, cause));
        }
        if !self.cache_line_size_hint.is_power_of_two() {
            let cause: &str = "cache_line_size_hint must be a power of two";
            error!("build(): {}", cause);
            return Err(Fail::new(libc::EINVAL, cause));
        }
        if self.cutoff_default == 0 {
            let cause: &str = "cutoff_default must be at least one";
            error!("build(): {}", cause);
            return Err(Fail::new(libc::EINVAL, cause));
        }

        let instrument: Arc<Instrumentation> = match self.instrument {
            Some(instrument) => {
                if instrument.is_enabled() && instrument.worker_count() != worker_count {
                    let cause: &str = "instrumentation ledger was sized for a different worker count";
                    error!("build(): {}", cause);
                    return Err(Fail::new(libc::EINVAL, cause));
                }
                instrument
            },
            None => Instrumentation::disabled(),
        };

        let locals: Vec<LocalDeque<Task>> = (0..worker_count).map(|_| LocalDeque::new_lifo()).collect();
        let stealers: Vec<Stealer<Task>> = locals.iter().map(LocalDeque::stealer).collect();

        let shared: Arc<PoolShared> = Arc::new(PoolShared {
            worker_count,
            steal_strategy: self.steal_strategy,
            cutoff_default: self.cutoff_default,
            injectors: InjectorQueue::new(),
            stealers,
            gate: IdleGate::new(),
            shutting_down: AtomicBool::new(false),
            inflight: AtomicUsize::new(0),
            next_task_id: AtomicU64::new(0),
            root_scope: Arc::new(JoinScope::new()),
            instrument,
        });

        debug!(
            "build(): workers={} strategy={:?} cutoff_default={}",
            worker_count, self.steal_strategy, self.cutoff_default
        );

        let mut threads: Vec<thread::JoinHandle<()>> = Vec::with_capacity(worker_count);
        for (index, local) in locals.into_iter().enumerate() {
            let worker_shared: Arc<PoolShared> = shared.clone();
            let result = thread::Builder::new()
                .name(format!("forkpool-worker-{}", index))
                .spawn(move || worker::run(WorkerCore::new(WorkerId(index), worker_shared, local)));
            match result {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    error!("build(): failed to spawn worker {} ({:?})", index, e);
                    shared.shutting_down.store(true, Ordering::Release);
                    shared.gate.wake_all();
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(Fail::from(e));
                },
            }
        }

        Ok(WorkerPool {
            shared,
            threads: Mutex::new(threads),
        })
    }
}

impl WorkerPool {
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Submits a task with normal priority. Never blocks; the handle observes the task from Pending on.
    pub fn submit<F, R>(&self, body: F) -> Result<TaskHandle<R>, Fail>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        submit_task(&self.shared, Priority::Normal, body)
    }

    /// Submits a task on the injector lane selected by `priority`. Submissions from inside a worker go to that
    /// worker's own deque regardless of priority.
    pub fn submit_with_priority<F, R>(&self, priority: Priority, body: F) -> Result<TaskHandle<R>, Fail>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        submit_task(&self.shared, priority, body)
    }

    /// Hands back a cloneable scheduling front-end onto this pool.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.shared.clone())
    }

    /// Ledger this pool records task execution into.
    pub fn instrumentation(&self) -> Arc<Instrumentation> {
        self.shared.instrument.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Begins shutdown: rejects new submissions, lets the workers run every task already accepted, then joins the
    /// worker threads. Idempotent; concurrent callers block until the drain completes.
    pub fn shutdown(&self) -> Result<(), Fail> {
        if let Some(core) = context::current_worker() {
            if Arc::ptr_eq(core.shared(), &self.shared) {
                let cause: &str = "cannot shut down a pool from one of its own workers";
                error!("shutdown(): {}", cause);
                return Err(Fail::new(libc::EDEADLK, cause));
            }
        }

        if self.shared.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("shutdown(): pool is already shutting down");
        }
        self.shared.gate.wake_all();

        let mut threads: MutexGuard<Vec<thread::JoinHandle<()>>> =
            self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        let mut result: Result<(), Fail> = Ok(());
        for handle in threads.drain(..) {
            if handle.join().is_err() {
                error!("shutdown(): a worker thread panicked outside any task");
                result = Err(Fail::new(libc::ECANCELED, "worker thread panicked"));
            }
        }
        result
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Accepts a task into the pool: accounts it as inflight, attaches it to the spawning context's scope, and makes it
/// visible to the workers. The inflight count is raised before the shutdown re-check, so an accepted task is always
/// executed before the workers exit.
pub(crate) fn submit_task<F, R>(shared: &Arc<PoolShared>, priority: Priority, body: F) -> Result<TaskHandle<R>, Fail>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if shared.is_shutting_down() {
        return Err(Fail::pool_shutdown());
    }
    shared.inflight.fetch_add(1, Ordering::AcqRel);
    if shared.is_shutting_down() {
        shared.task_retired();
        return Err(Fail::pool_shutdown());
    }

    // A spawn from inside one of this pool's workers stays on that worker's deque; everything else goes through the
    // injector, including spawns made from tasks of a different pool.
    let home: Option<::std::rc::Rc<WorkerCore>> = match context::current_worker() {
        Some(core) if Arc::ptr_eq(core.shared(), shared) => Some(core),
        _ => None,
    };
    let origin: Option<WorkerId> = home.as_ref().map(|core| core.id());
    let scope: Arc<JoinScope> = match context::current_task_scope() {
        Some(scope) => scope,
        None => shared.root_scope.clone(),
    };

    let id: TaskId = shared.allocate_task_id();
    let (task, handle) = Task::pair(id, priority, origin, scope, shared.instrument.clone(), body);
    trace!("submit_task(): task={} priority={:?} origin={:?}", id, priority, origin);

    match home {
        Some(core) => core.push_local(task),
        None => {
            shared.injectors.push(task);
            shared.gate.wake_one();
        },
    }
    Ok(handle)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("drop(): shutdown failed ({:?})", e);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
