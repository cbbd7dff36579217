// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    limits,
    scheduler::task::{
        Priority,
        Task,
    },
};
use ::crossbeam_deque::{
    Injector,
    Steal,
    Worker,
};
use ::std::iter;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Global entry queue of a pool: one FIFO injector lane per priority. Tasks submitted from outside the pool land
/// here; workers drain the high lane before the normal one.
pub struct InjectorQueue {
    high: Injector<Task>,
    normal: Injector<Task>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl InjectorQueue {
    pub fn new() -> Self {
        Self {
            high: Injector::new(),
            normal: Injector::new(),
        }
    }

    /// Enqueues a task on the lane selected by its priority.
    pub fn push(&self, task: Task) {
        match task.priority() {
            Priority::High => self.high.push(task),
            Priority::Normal => self.normal.push(task),
        }
    }

    /// Moves a batch of tasks into `local` and pops one, preferring the high lane. Returns None when both lanes are
    /// empty or contended past the retry budget.
    pub fn steal_into(&self, local: &Worker<Task>) -> Option<Task> {
        iter::repeat_with(|| {
            self.high
                .steal_batch_and_pop(local)
                .or_else(|| self.normal.steal_batch_and_pop(local))
        })
        .take(limits::MAX_STEAL_RETRIES)
        .find(|steal| !steal.is_retry())
        .and_then(Steal::success)
    }

    /// Pops one task without a local deque, preferring the high lane. Used by non-worker threads helping a join.
    pub fn steal(&self) -> Option<Task> {
        iter::repeat_with(|| self.high.steal().or_else(|| self.normal.steal()))
            .take(limits::MAX_STEAL_RETRIES)
            .find(|steal| !steal.is_retry())
            .and_then(Steal::success)
    }

    /// Checks whether both lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
