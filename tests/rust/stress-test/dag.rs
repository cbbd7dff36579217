// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::forkpool::{
    DependencyGraph,
    GraphReport,
    NodeId,
    WorkerPool,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Arc,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Layers in the random DAG.
const LAYERS: usize = 12;

/// Nodes per layer.
const WIDTH: usize = 16;

/// Seed of the DAG shape, fixed so runs are reproducible.
const DAG_SEED: u64 = 7;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Runs the layered random DAG scenario.
pub fn run(workers: usize) -> Vec<(String, String, Result<(), anyhow::Error>)> {
    let mut result: Vec<(String, String, Result<(), anyhow::Error>)> = Vec::new();

    crate::collect!(result, crate::test!(layered_dag_executes_in_order(workers)));

    result
}

/// Builds a layered DAG where every node depends on a random subset of the previous layer, executes it, and checks
/// that no node ran before all of its layer predecessors.
fn layered_dag_executes_in_order(workers: usize) -> Result<()> {
    let mut rng: SmallRng = SmallRng::seed_from_u64(DAG_SEED);
    let mut graph: DependencyGraph = DependencyGraph::new();

    // Ticket counter: each body takes a ticket, and tickets must respect layer order along every edge.
    let clock: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let tickets: Arc<Vec<AtomicUsize>> = Arc::new((0..LAYERS * WIDTH).map(|_| AtomicUsize::new(0)).collect());

    let mut edges: Vec<(usize, usize)> = Vec::new();
    for layer in 0..LAYERS {
        for slot in 0..WIDTH {
            let index: usize = layer * WIDTH + slot;
            let mut predecessors: Vec<NodeId> = Vec::new();
            if layer > 0 {
                for previous_slot in 0..WIDTH {
                    if rng.gen_range(0..WIDTH) < 3 {
                        let previous: usize = (layer - 1) * WIDTH + previous_slot;
                        predecessors.push(NodeId(previous as u64));
                        edges.push((previous, index));
                    }
                }
            }
            let clock: Arc<AtomicUsize> = clock.clone();
            let tickets: Arc<Vec<AtomicUsize>> = tickets.clone();
            let cost_hint: u64 = rng.gen_range(1..100);
            graph.add(NodeId(index as u64), cost_hint, &predecessors, move |_| {
                tickets[index].store(clock.fetch_add(1, Ordering::AcqRel) + 1, Ordering::Release);
                Ok(())
            })?;
        }
    }

    let pool: WorkerPool = WorkerPool::builder().worker_count(workers).build()?;
    let report: GraphReport = graph.execute(&pool.scheduler())?;
    pool.shutdown()?;

    if report.completed.len() != LAYERS * WIDTH || !report.is_clean() {
        anyhow::bail!(
            "expected {} clean completions, got {} completed and {} failed",
            LAYERS * WIDTH,
            report.completed.len(),
            report.failed.len()
        );
    }
    for &(predecessor, successor) in &edges {
        let before: usize = tickets[predecessor].load(Ordering::Acquire);
        let after: usize = tickets[successor].load(Ordering::Acquire);
        if before == 0 || after == 0 || before >= after {
            anyhow::bail!("edge {} -> {} executed out of order ({} vs {})", predecessor, successor, before, after);
        }
    }
    println!("    dag: {} nodes, {} edges", LAYERS * WIDTH, edges.len());
    Ok(())
}
