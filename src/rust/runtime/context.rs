// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::{
    scope::JoinScope,
    worker::WorkerCore,
};
use ::std::{
    cell::RefCell,
    rc::Rc,
    sync::Arc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Spawning context of the current thread. A thread is inside a task only between the moment an executor begins
/// running a task body and the moment the body returns or unwinds; the scope of that task's children is created
/// lazily on the first spawn.
enum ScopeSlot {
    NotInTask,
    InTask(Option<Arc<JoinScope>>),
}

/// Installs a worker core as the current thread's executor. Dropped when the worker exits.
pub struct WorkerGuard;

/// Marks the current thread as running a task body. Restores the previous spawning context when dropped, which keeps
/// nested execution (a joiner helping with other tasks) correctly scoped.
pub struct TaskScopeGuard {
    previous: ScopeSlot,
}

//======================================================================================================================
// Thread Local Storage
//======================================================================================================================

thread_local! {
    /// Core of the pool worker running on this thread, if any.
    static CURRENT_WORKER: RefCell<Option<Rc<WorkerCore>>> = RefCell::new(None);
    /// Spawning context of the task running on this thread, if any.
    static CURRENT_SCOPE: RefCell<ScopeSlot> = RefCell::new(ScopeSlot::NotInTask);
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl WorkerGuard {
    /// Installs `core` as this thread's executor.
    pub fn install(core: Rc<WorkerCore>) -> Self {
        CURRENT_WORKER.with(|current| {
            let previous: Option<Rc<WorkerCore>> = current.borrow_mut().replace(core);
            debug_assert!(previous.is_none());
        });
        Self {}
    }
}

impl TaskScopeGuard {
    /// Marks this thread as running a task body with no children yet.
    pub fn enter() -> Self {
        let previous: ScopeSlot = CURRENT_SCOPE.with(|current| current.replace(ScopeSlot::InTask(None)));
        Self { previous }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Core of the pool worker running on this thread, if this thread is a pool worker.
pub fn current_worker() -> Option<Rc<WorkerCore>> {
    CURRENT_WORKER.with(|current| current.borrow().clone())
}

/// Scope that tasks spawned from the current context should join, creating it if this is the first spawn of the
/// running task. Returns None when the thread is not running any task.
pub fn current_task_scope() -> Option<Arc<JoinScope>> {
    CURRENT_SCOPE.with(|current| match &mut *current.borrow_mut() {
        ScopeSlot::NotInTask => None,
        ScopeSlot::InTask(slot) => match slot {
            Some(scope) => Some(scope.clone()),
            None => {
                let scope: Arc<JoinScope> = Arc::new(JoinScope::new());
                *slot = Some(scope.clone());
                Some(scope)
            },
        },
    })
}

/// Scope of the running task if it has spawned any children. Never creates a scope.
pub fn current_task_scope_if_any() -> Option<Arc<JoinScope>> {
    CURRENT_SCOPE.with(|current| match &*current.borrow() {
        ScopeSlot::NotInTask => None,
        ScopeSlot::InTask(scope) => scope.clone(),
    })
}

/// Checks whether the current thread is running a task body.
pub fn in_task() -> bool {
    CURRENT_SCOPE.with(|current| matches!(&*current.borrow(), ScopeSlot::InTask(_)))
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        CURRENT_WORKER.with(|current| {
            current.borrow_mut().take();
        });
    }
}

impl Drop for TaskScopeGuard {
    fn drop(&mut self) {
        CURRENT_SCOPE.with(|current| {
            let previous: ScopeSlot = ::std::mem::replace(&mut self.previous, ScopeSlot::NotInTask);
            *current.borrow_mut() = previous;
        });
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
