// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod handle;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod scope;
pub mod task;
pub mod worker;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    handle::TaskHandle,
    pool::{
        PoolBuilder,
        WorkerPool,
    },
    scheduler::{
        InlineScheduler,
        Schedule,
        Scheduler,
    },
    scope::JoinScope,
    task::{
        Priority,
        TaskId,
        TaskState,
        WorkerId,
    },
};
