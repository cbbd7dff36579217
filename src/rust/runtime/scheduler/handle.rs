// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::task::{
        TaskId,
        TaskSlot,
        TaskState,
    },
};
use ::std::{
    sync::Arc,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Handle observing one submitted task. Handles are cheap to clone and remain valid after the task finishes; the
/// captured result is handed out exactly once across all clones.
pub struct TaskHandle<R> {
    slot: Arc<TaskSlot<R>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<R> TaskHandle<R> {
    pub(crate) fn new(slot: Arc<TaskSlot<R>>) -> Self {
        Self { slot }
    }

    /// Identifier of the task this handle observes.
    pub fn id(&self) -> TaskId {
        self.slot.id()
    }

    /// Current state of the task.
    pub fn state(&self) -> TaskState {
        self.slot.state()
    }

    /// Checks whether the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.slot.is_terminal()
    }

    /// Takes the task outcome if the task is terminal. Returns None while the task is still pending or running.
    pub(crate) fn try_take_result(&self) -> Option<Result<R, Fail>> {
        self.slot.try_take_outcome()
    }

    /// Waits until the task is terminal or the timeout elapses. Returns true when the task is terminal.
    pub(crate) fn wait_terminal(&self, timeout: Duration) -> bool {
        self.slot.wait_terminal(timeout)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<R> Clone for TaskHandle<R> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
