// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::id_map::IdMap,
    runtime::{
        fail::Fail,
        graph::{
            DependencyGraph,
            Node,
            NodeCtx,
            NodeId,
        },
        limits,
        scheduler::scheduler::Schedule,
    },
};
use ::crossbeam_channel::{
    self,
    Receiver,
    RecvTimeoutError,
    Sender,
    TryRecvError,
};
use ::slab::Slab;
use ::std::panic::{
    self,
    AssertUnwindSafe,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-node outcomes of one graph execution, in completion order. Node failures are data, not errors: execution
/// itself only fails on structural problems (cycle, unknown predecessor) or pool shutdown.
#[derive(Debug, Default)]
pub struct GraphReport {
    /// Nodes whose body returned Ok.
    pub completed: Vec<NodeId>,
    /// Nodes whose body returned an error or panicked.
    pub failed: Vec<NodeId>,
    /// The first failure observed, if any.
    pub first_failure: Option<(NodeId, Fail)>,
}

/// Bookkeeping of one node during execution.
struct NodeState {
    id: NodeId,
    /// Predecessors that have not reached a terminal state yet.
    blocking: usize,
    /// Slab keys of the nodes that depend on this one.
    successors: Vec<usize>,
    /// Transitive predecessors that failed, accumulated as predecessors finish.
    failed_ancestors: Vec<NodeId>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl GraphReport {
    /// Checks whether every node completed without a failure.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl DependencyGraph {
    /// Executes the graph on `scheduler`, consuming it. A node is submitted once every one of its predecessors has
    /// reached a terminal state, never before; among simultaneously eligible nodes, the costlier ones are submitted
    /// first. A failed predecessor does not cancel its dependents: they run with the failure token set in their
    /// [NodeCtx], and the decision to proceed or self-report stays with the node body. While waiting for completion
    /// events the driver helps execute pending tasks, so a small pool is never starved by the driver itself.
    pub fn execute<S: Schedule>(self, scheduler: &S) -> Result<GraphReport, Fail> {
        // Nothing is submitted if the graph does not validate.
        self.validate()?;

        let total: usize = self.len();
        let (ids, mut nodes): (IdMap<NodeId, usize>, Slab<Node>) = self.into_parts();

        let mut states: Vec<Option<NodeState>> = Vec::with_capacity(nodes.capacity());
        states.resize_with(nodes.capacity(), || None);
        for (key, node) in nodes.iter() {
            states[key] = Some(NodeState {
                id: node.id,
                blocking: node.predecessors.len(),
                successors: Vec::new(),
                failed_ancestors: Vec::new(),
            });
        }
        for (key, node) in nodes.iter() {
            for predecessor in &node.predecessors {
                // Checked by validate above.
                let predecessor_key: usize = ids.get(predecessor).ok_or_else(|| Fail::unknown_node(predecessor.0))?;
                if let Some(state) = states[predecessor_key].as_mut() {
                    state.successors.push(key);
                }
            }
        }

        let (event_tx, event_rx): (Sender<(usize, Result<(), Fail>)>, Receiver<(usize, Result<(), Fail>)>) =
            crossbeam_channel::unbounded();

        let initially_eligible: Vec<usize> = states
            .iter()
            .enumerate()
            .filter_map(|(key, state)| state.as_ref().filter(|state| state.blocking == 0).map(|_| key))
            .collect();
        submit_eligible(scheduler, &mut nodes, &states, initially_eligible, &event_tx)?;

        let mut report: GraphReport = GraphReport::default();
        let mut terminal: usize = 0;
        while terminal < total {
            let (key, outcome): (usize, Result<(), Fail>) = match event_rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => {
                    if scheduler.help_one() {
                        continue;
                    }
                    match event_rx.recv_timeout(limits::JOIN_WAIT_TIMEOUT) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        // The driver holds a sender, so the channel cannot disconnect.
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                },
                Err(TryRecvError::Disconnected) => break,
            };
            terminal += 1;

            let (node_id, mut inherited): (NodeId, Vec<NodeId>) = match states[key].as_ref() {
                Some(state) => (state.id, state.failed_ancestors.clone()),
                None => continue,
            };
            match outcome {
                Ok(()) => report.completed.push(node_id),
                Err(fail) => {
                    debug!("execute(): node {} failed ({:?})", node_id, fail);
                    report.failed.push(node_id);
                    if report.first_failure.is_none() {
                        report.first_failure = Some((node_id, fail));
                    }
                    inherited.push(node_id);
                },
            }

            let successors: Vec<usize> = match states[key].as_ref() {
                Some(state) => state.successors.clone(),
                None => continue,
            };
            let mut newly_eligible: Vec<usize> = Vec::new();
            for successor in successors {
                if let Some(state) = states[successor].as_mut() {
                    state.failed_ancestors.extend(inherited.iter().copied());
                    state.blocking -= 1;
                    if state.blocking == 0 {
                        newly_eligible.push(successor);
                    }
                }
            }
            submit_eligible(scheduler, &mut nodes, &states, newly_eligible, &event_tx)?;
        }
        Ok(report)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Submits every eligible node, costlier nodes first; ties keep insertion order. The node body runs behind a panic
/// boundary of its own, so the completion event is delivered whether the body returns, errs, or unwinds.
fn submit_eligible<S: Schedule>(
    scheduler: &S,
    nodes: &mut Slab<Node>,
    states: &[Option<NodeState>],
    mut eligible: Vec<usize>,
    event_tx: &Sender<(usize, Result<(), Fail>)>,
) -> Result<(), Fail> {
    eligible.sort_by_key(|&key| (std::cmp::Reverse(nodes[key].cost_hint), key));
    for key in eligible {
        let node: Node = nodes.remove(key);
        let ctx: NodeCtx = match states[key].as_ref() {
            Some(state) => NodeCtx::new(node.id, state.failed_ancestors.clone()),
            None => NodeCtx::new(node.id, Vec::new()),
        };
        let body = node.body;
        let event_tx: Sender<(usize, Result<(), Fail>)> = event_tx.clone();
        trace!("submit_eligible(): node={} cost_hint={}", node.id, node.cost_hint);
        scheduler.spawn(move || {
            let outcome: Result<(), Fail> = match panic::catch_unwind(AssertUnwindSafe(|| body(&ctx))) {
                Ok(outcome) => outcome,
                Err(payload) => Err(Fail::task_panicked(payload.as_ref())),
            };
            let _ = event_tx.send((key, outcome));
        })?;
    }
    Ok(())
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
