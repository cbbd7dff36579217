// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    sync::{
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

/// Counter of outstanding descendant tasks associated with one spawning context. Every task spawned from that context
/// registers here strictly before it becomes visible to any queue, so the count never under-reports.
pub struct JoinScope {
    /// Number of registered tasks that have not reached a terminal state.
    outstanding: Mutex<usize>,
    /// Signaled whenever the count drops to zero.
    drained: Condvar,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl JoinScope {
    pub fn new() -> Self {
        Self {
            outstanding: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Accounts for a task about to be enqueued.
    pub fn register(&self) {
        let mut outstanding: MutexGuard<usize> =
            self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding += 1;
    }

    /// Accounts for a registered task that reached a terminal state.
    pub fn finished(&self) {
        let mut outstanding: MutexGuard<usize> =
            self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(*outstanding > 0);
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.drained.notify_all();
        }
    }

    /// Number of registered tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until the count reaches zero or the timeout elapses. Returns true when the scope is drained.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let mut outstanding: MutexGuard<usize> =
            self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        if *outstanding == 0 {
            return true;
        }
        let result = self
            .drained
            .wait_timeout(outstanding, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        outstanding = result.0;
        *outstanding == 0
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for JoinScope {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
