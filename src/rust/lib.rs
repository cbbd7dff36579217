// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the calling test with both values otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {{
        let left = &$left;
        let right = &$right;
        if !(left == right) {
            ::anyhow::bail!(
                "ensure_eq failed: `{}` == `{}` (left: `{:?}`, right: `{:?}`)",
                stringify!($left),
                stringify!($right),
                left,
                right,
            );
        }
    }};
}

/// Ensures that two expressions are not equal, bailing out of the calling test otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {{
        let left = &$left;
        let right = &$right;
        if left == right {
            ::anyhow::bail!(
                "ensure_neq failed: `{}` != `{}` (both: `{:?}`)",
                stringify!($left),
                stringify!($right),
                left,
            );
        }
    }};
}

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod collections;
pub mod perftools;
pub mod runtime;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    perftools::instrument::{
        report::{
            DurationPercentiles,
            Report,
            WorkerLoad,
        },
        Instrumentation,
        TaskRecord,
    },
    runtime::{
        config::{
            Config,
            StealStrategy,
        },
        fail::Fail,
        graph::{
            executor::GraphReport,
            DependencyGraph,
            NodeCtx,
            NodeId,
        },
        scheduler::{
            InlineScheduler,
            JoinScope,
            PoolBuilder,
            Priority,
            Schedule,
            Scheduler,
            TaskHandle,
            TaskId,
            TaskState,
            WorkerId,
            WorkerPool,
        },
    },
};
