// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Program-facing fork/join API. [Schedule] is the seam between algorithmic code and task execution: [Scheduler]
//! runs tasks on a worker pool, [InlineScheduler] runs every task at its spawn point for deterministic tests.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    perftools::instrument::Instrumentation,
    runtime::{
        context,
        fail::Fail,
        limits,
        scheduler::{
            handle::TaskHandle,
            pool::{
                self,
                PoolShared,
            },
            scope::JoinScope,
            task::{
                Priority,
                Task,
                TaskId,
            },
        },
    },
};
use ::std::{
    ops::Range,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Task execution seam. Algorithms written against this trait run unchanged on a worker pool or on the
/// single-threaded inline implementation.
pub trait Schedule: Clone + Send + Sync + 'static {
    /// Spawns a task on the lane selected by `priority`. Inside a running task, the new task is accounted against
    /// that task's children before it becomes visible to any queue.
    fn spawn_with_priority<F, R>(&self, priority: Priority, body: F) -> Result<TaskHandle<R>, Fail>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static;

    /// Blocks until the task is terminal and returns its result or captured failure.
    fn join<R>(&self, handle: &TaskHandle<R>) -> Result<R, Fail>
    where
        R: Send + 'static;

    /// Blocks until every task spawned from the current context has reached a terminal state.
    fn join_all_children(&self) -> Result<(), Fail>;

    /// Number of worker threads backing this scheduler.
    fn worker_count(&self) -> usize;

    /// Cutoff applied by [Schedule::recursive_cutoff] when the caller passes zero.
    fn default_cutoff(&self) -> usize;

    /// Runs one pending task on the calling thread, if any is available. Blocked callers use this to keep the
    /// hardware busy instead of sleeping.
    fn help_one(&self) -> bool {
        false
    }

    /// Spawns a task with normal priority.
    fn spawn<F, R>(&self, body: F) -> Result<TaskHandle<R>, Fail>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.spawn_with_priority(Priority::Normal, body)
    }

    /// Joins every handle, even when an early one fails, so no task is left orphaned. Returns the results in order,
    /// or the first captured failure in handle order.
    fn join_all<R>(&self, handles: Vec<TaskHandle<R>>) -> Result<Vec<R>, Fail>
    where
        R: Send + 'static,
    {
        let mut first_failure: Option<Fail> = None;
        let mut results: Vec<R> = Vec::with_capacity(handles.len());
        for handle in &handles {
            match self.join(handle) {
                Ok(result) => results.push(result),
                Err(fail) => {
                    if first_failure.is_none() {
                        first_failure = Some(fail);
                    }
                },
            }
        }
        match first_failure {
            Some(fail) => Err(fail),
            None => Ok(results),
        }
    }

    /// Divide-and-conquer driver over the index range `0..n`. Ranges no longer than the cutoff run `base_case`
    /// inline; larger ranges split at the midpoint, fork the right half, recurse into the left half on the calling
    /// thread, then join and `combine`. A cutoff of zero selects [Schedule::default_cutoff]. The result equals the
    /// sequential fold for any cutoff, provided `combine` is associative; that part of the contract is the caller's.
    fn recursive_cutoff<R, B, C>(&self, n: usize, cutoff: usize, base_case: B, combine: C) -> Result<R, Fail>
    where
        R: Send + 'static,
        B: Fn(Range<usize>) -> R + Send + Sync + 'static,
        C: Fn(R, R) -> R + Send + Sync + 'static,
    {
        let cutoff: usize = if cutoff == 0 { self.default_cutoff().max(1) } else { cutoff };
        split_range(self, 0..n, cutoff, 0, &Arc::new(base_case), &Arc::new(combine))
    }
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Cloneable front-end onto one worker pool. Obtained from [crate::runtime::scheduler::pool::WorkerPool::scheduler];
/// remains valid for the lifetime of the pool.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<PoolShared>,
}

/// Deterministic test double: every spawned task runs to completion on the calling thread before `spawn` returns.
#[derive(Clone)]
pub struct InlineScheduler {
    state: Arc<InlineState>,
}

struct InlineState {
    /// Allocator for task identifiers.
    next_task_id: AtomicU64,
    /// Scope that spawns from outside any task attach to. Always drained, since tasks finish at the spawn point.
    root_scope: Arc<JoinScope>,
    /// Ledger task executions are recorded into.
    instrument: Arc<Instrumentation>,
    /// Cutoff applied when a caller passes zero.
    cutoff_default: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Scheduler {
    pub(crate) fn new(shared: Arc<PoolShared>) -> Self {
        Self { shared }
    }
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::with_cutoff(limits::DEFAULT_CUTOFF)
    }

    /// Creates an inline scheduler with the given default cutoff.
    pub fn with_cutoff(cutoff_default: usize) -> Self {
        Self {
            state: Arc::new(InlineState {
                next_task_id: AtomicU64::new(0),
                root_scope: Arc::new(JoinScope::new()),
                instrument: Instrumentation::disabled(),
                cutoff_default: cutoff_default.max(1),
            }),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Schedule for Scheduler {
    fn spawn_with_priority<F, R>(&self, priority: Priority, body: F) -> Result<TaskHandle<R>, Fail>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        pool::submit_task(&self.shared, priority, body)
    }

    /// Joins with the helping discipline: while the task is not terminal, the caller executes other pending tasks
    /// instead of sleeping, so a blocked joiner is itself an execution resource and a join can never starve the pool.
    fn join<R>(&self, handle: &TaskHandle<R>) -> Result<R, Fail>
    where
        R: Send + 'static,
    {
        while !handle.is_finished() {
            if !self.help_one() {
                handle.wait_terminal(limits::JOIN_WAIT_TIMEOUT);
            }
        }
        match handle.try_take_result() {
            Some(result) => result,
            None => Err(Fail::result_taken(handle.id().into())),
        }
    }

    fn join_all_children(&self) -> Result<(), Fail> {
        let scope: Arc<JoinScope> = if context::in_task() {
            match context::current_task_scope_if_any() {
                Some(scope) => scope,
                // The running task has not spawned anything.
                None => return Ok(()),
            }
        } else {
            self.shared.root_scope().clone()
        };

        while scope.outstanding() > 0 {
            if !self.help_one() {
                scope.wait_drained(limits::JOIN_WAIT_TIMEOUT);
            }
        }
        Ok(())
    }

    fn worker_count(&self) -> usize {
        self.shared.worker_count()
    }

    fn default_cutoff(&self) -> usize {
        self.shared.cutoff_default()
    }

    fn help_one(&self) -> bool {
        // A worker of this pool helps through its own deque; any other thread steals from the pool's queues.
        if let Some(core) = context::current_worker() {
            if Arc::ptr_eq(core.shared(), &self.shared) {
                if let Some(task) = core.find_task() {
                    core.run_task(task);
                    return true;
                }
                return false;
            }
        }
        if let Some(task) = self.shared.steal_for_external() {
            task.run(None);
            self.shared.task_retired();
            return true;
        }
        false
    }
}

impl Schedule for InlineScheduler {
    fn spawn_with_priority<F, R>(&self, priority: Priority, body: F) -> Result<TaskHandle<R>, Fail>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let scope: Arc<JoinScope> = match context::current_task_scope() {
            Some(scope) => scope,
            None => self.state.root_scope.clone(),
        };
        let id: TaskId = TaskId(self.state.next_task_id.fetch_add(1, Ordering::Relaxed));
        let (task, handle) = Task::pair(id, priority, None, scope, self.state.instrument.clone(), body);
        task.run(None);
        Ok(handle)
    }

    fn join<R>(&self, handle: &TaskHandle<R>) -> Result<R, Fail>
    where
        R: Send + 'static,
    {
        // Inline tasks are terminal by the time spawn returns.
        while !handle.is_finished() {
            handle.wait_terminal(limits::JOIN_WAIT_TIMEOUT);
        }
        match handle.try_take_result() {
            Some(result) => result,
            None => Err(Fail::result_taken(handle.id().into())),
        }
    }

    fn join_all_children(&self) -> Result<(), Fail> {
        Ok(())
    }

    fn worker_count(&self) -> usize {
        1
    }

    fn default_cutoff(&self) -> usize {
        self.state.cutoff_default
    }
}

impl Default for InlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Recursive splitter behind [Schedule::recursive_cutoff]. Depth is threaded explicitly: past the split depth limit
/// the remaining range is folded sequentially, which bounds both the task count and the call stack.
fn split_range<S, R, B, C>(
    scheduler: &S,
    range: Range<usize>,
    cutoff: usize,
    depth: usize,
    base_case: &Arc<B>,
    combine: &Arc<C>,
) -> Result<R, Fail>
where
    S: Schedule,
    R: Send + 'static,
    B: Fn(Range<usize>) -> R + Send + Sync + 'static,
    C: Fn(R, R) -> R + Send + Sync + 'static,
{
    if range.len() <= cutoff {
        return Ok(base_case.as_ref()(range));
    }
    if depth >= limits::MAX_SPLIT_DEPTH {
        return Ok(fold_sequential(range, cutoff, base_case.as_ref(), combine.as_ref()));
    }

    let mid: usize = range.start + range.len() / 2;
    let right_handle: TaskHandle<Result<R, Fail>> = {
        let forked: S = scheduler.clone();
        let base_case: Arc<B> = base_case.clone();
        let combine: Arc<C> = combine.clone();
        let right: Range<usize> = mid..range.end;
        scheduler.spawn(move || split_range(&forked, right, cutoff, depth + 1, &base_case, &combine))?
    };

    let left: Result<R, Fail> = split_range(scheduler, range.start..mid, cutoff, depth + 1, base_case, combine);
    // The forked half is joined even when the left half failed, so no task is left orphaned.
    let right: Result<R, Fail> = scheduler.join(&right_handle).and_then(::std::convert::identity);
    Ok(combine.as_ref()(left?, right?))
}

/// Left fold of `range` in cutoff-sized chunks, with no forking.
fn fold_sequential<R, B, C>(range: Range<usize>, cutoff: usize, base_case: &B, combine: &C) -> R
where
    B: Fn(Range<usize>) -> R,
    C: Fn(R, R) -> R,
{
    // Callers only fold ranges longer than the cutoff, so there is at least one chunk.
    let mut next: usize = (range.start + cutoff).min(range.end);
    let mut accumulator: R = base_case(range.start..next);
    while next < range.end {
        let stop: usize = (next + cutoff).min(range.end);
        accumulator = combine(accumulator, base_case(next..stop));
        next = stop;
    }
    accumulator
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
