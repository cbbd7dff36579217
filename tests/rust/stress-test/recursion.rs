// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::forkpool::{
    Schedule,
    WorkerPool,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Runs the deep-recursion scenarios.
pub fn run(workers: usize, problem_size: usize) -> Vec<(String, String, Result<(), anyhow::Error>)> {
    let mut result: Vec<(String, String, Result<(), anyhow::Error>)> = Vec::new();

    crate::collect!(result, crate::test!(recursion_is_cutoff_invariant(workers, problem_size)));
    crate::collect!(result, crate::test!(recursion_handles_degenerate_cutoffs(workers)));

    result
}

/// Sums a large range under several cutoffs; every run must agree with the closed form.
fn recursion_is_cutoff_invariant(workers: usize, problem_size: usize) -> Result<()> {
    let n: usize = problem_size.max(2);
    let expected: u128 = (n as u128 - 1) * n as u128 / 2;

    let pool: WorkerPool = WorkerPool::builder().worker_count(workers).build()?;
    let scheduler = pool.scheduler();
    for cutoff in [64, 1_024, n / 7 + 1, n] {
        let sum: u128 = scheduler.recursive_cutoff(
            n,
            cutoff,
            |range| range.map(|i| i as u128).sum::<u128>(),
            |left, right| left + right,
        )?;
        if sum != expected {
            anyhow::bail!("cutoff {}: got {}, expected {}", cutoff, sum, expected);
        }
    }
    pool.shutdown()?;
    Ok(())
}

/// Exercises the extreme cutoffs: one element per task, and a single sequential task for the whole range.
fn recursion_handles_degenerate_cutoffs(workers: usize) -> Result<()> {
    const N: usize = 10_000;
    let expected: u64 = (N as u64 - 1) * N as u64 / 2;

    let pool: WorkerPool = WorkerPool::builder().worker_count(workers).build()?;
    let scheduler = pool.scheduler();
    for cutoff in [1, N, 10 * N] {
        let sum: u64 = scheduler.recursive_cutoff(
            N,
            cutoff,
            |range| range.map(|i| i as u64).sum::<u64>(),
            |left, right| left + right,
        )?;
        if sum != expected {
            anyhow::bail!("cutoff {}: got {}, expected {}", cutoff, sum, expected);
        }
    }
    pool.shutdown()?;
    Ok(())
}
