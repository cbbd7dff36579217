// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    perftools::instrument::Instrumentation,
    runtime::{
        context,
        fail::Fail,
        scheduler::{
            handle::TaskHandle,
            scope::JoinScope,
        },
    },
};
use ::std::{
    fmt,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Externally visible task identifier. Unique within the pool that allocated it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Index of a worker thread within its pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WorkerId(pub usize);

/// Queueing hint for externally submitted tasks. High priority tasks are taken from the global queue ahead of normal
/// ones; the hint never preempts anything.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Priority {
    High,
    #[default]
    Normal,
}

/// Lifecycle of a task. The only legal transitions are Pending to Running on dequeue and Running to one of the two
/// terminal states when the body returns or unwinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Completion slot shared between a task and the handles that observe it.
pub struct TaskSlot<R> {
    /// Identifier of the task this slot belongs to.
    id: TaskId,
    /// State and, once terminal, the captured outcome.
    inner: Mutex<SlotInner<R>>,
    /// Signaled when the task reaches a terminal state.
    terminal: Condvar,
}

struct SlotInner<R> {
    state: TaskState,
    outcome: Option<Result<R, Fail>>,
}

/// A schedulable unit: an erased task body plus the bookkeeping it carries through queues. Running consumes the task.
pub struct Task {
    id: TaskId,
    priority: Priority,
    run_box: Box<dyn FnOnce(Option<WorkerId>) + Send>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TaskState {
    /// Checks whether this state is one of the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl<R> TaskSlot<R> {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            inner: Mutex::new(SlotInner {
                state: TaskState::Pending,
                outcome: None,
            }),
            terminal: Condvar::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().state.is_terminal()
    }

    /// Marks the task as running. Called exactly once, by the executing thread, right after dequeue.
    fn set_running(&self) {
        let mut inner: MutexGuard<SlotInner<R>> = self.lock();
        debug_assert_eq!(inner.state, TaskState::Pending);
        inner.state = TaskState::Running;
    }

    /// Records the outcome and moves the task to its terminal state. Called exactly once, by the executing thread.
    fn finish(&self, outcome: Result<R, Fail>) {
        let mut inner: MutexGuard<SlotInner<R>> = self.lock();
        debug_assert_eq!(inner.state, TaskState::Running);
        inner.state = match &outcome {
            Ok(_) => TaskState::Completed,
            Err(_) => TaskState::Failed,
        };
        inner.outcome = Some(outcome);
        drop(inner);
        self.terminal.notify_all();
    }

    /// Takes the outcome if the task is terminal. The outcome is handed out exactly once; later calls report that the
    /// result was already retrieved.
    pub fn try_take_outcome(&self) -> Option<Result<R, Fail>> {
        let mut inner: MutexGuard<SlotInner<R>> = self.lock();
        if !inner.state.is_terminal() {
            return None;
        }
        match inner.outcome.take() {
            Some(outcome) => Some(outcome),
            None => Some(Err(Fail::result_taken(self.id.into()))),
        }
    }

    /// Waits until the task reaches a terminal state or the timeout elapses. Returns true when the task is terminal.
    pub fn wait_terminal(&self, timeout: Duration) -> bool {
        let inner: MutexGuard<SlotInner<R>> = self.lock();
        if inner.state.is_terminal() {
            return true;
        }
        let result = self
            .terminal
            .wait_timeout(inner, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        result.0.state.is_terminal()
    }

    fn lock(&self) -> MutexGuard<SlotInner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Task {
    /// Builds a task and the handle observing it. The task accounts against `scope` from this point on, strictly
    /// before it is visible to any queue, so the scope never under-counts.
    pub fn pair<F, R>(
        id: TaskId,
        priority: Priority,
        origin: Option<WorkerId>,
        scope: Arc<JoinScope>,
        instrument: Arc<Instrumentation>,
        body: F,
    ) -> (Task, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        scope.register();
        let slot: Arc<TaskSlot<R>> = Arc::new(TaskSlot::new(id));
        let handle: TaskHandle<R> = TaskHandle::new(slot.clone());

        let run_box = Box::new(move |executor: Option<WorkerId>| {
            slot.set_running();
            instrument.record_start(id, executor, origin);
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                let _scope_guard = context::TaskScopeGuard::enter();
                body()
            }));
            instrument.record_end(id, executor);
            match result {
                Ok(output) => slot.finish(Ok(output)),
                Err(payload) => {
                    warn!("task {}: body panicked", id);
                    slot.finish(Err(Fail::task_panicked(payload.as_ref())));
                },
            }
            scope.finished();
        });

        let task: Task = Task {
            id,
            priority,
            run_box,
        };
        (task, handle)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Runs the task body to completion on the calling thread. `executor` names the worker this thread belongs to, or
    /// None when a non-worker thread executes the task while helping a join.
    pub fn run(self, executor: Option<WorkerId>) {
        (self.run_box)(executor);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TaskId> for u64 {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for WorkerId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<WorkerId> for usize {
    fn from(value: WorkerId) -> Self {
        value.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
