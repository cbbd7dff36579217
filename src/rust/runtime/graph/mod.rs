// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Static task graphs with declared predecessor ordering, distinct from the implicit ordering of nested spawn/join.
//! Nodes are registered with [DependencyGraph::add], checked with [DependencyGraph::validate], and run with
//! [DependencyGraph::execute].

//======================================================================================================================
// Modules
//======================================================================================================================

pub mod executor;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::id_map::IdMap,
    runtime::fail::Fail,
};
use ::slab::Slab;
use ::std::{
    collections::VecDeque,
    fmt,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Caller-chosen identifier of one graph node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Execution context handed to a node body. Carries the failure token of the node's transitive predecessors; whether
/// to proceed or self-report is the body's decision, the graph never cancels dependents.
pub struct NodeCtx {
    node_id: NodeId,
    failed_predecessors: Vec<NodeId>,
}

/// Body of one graph node.
pub type NodeBody = Box<dyn FnOnce(&NodeCtx) -> Result<(), Fail> + Send + 'static>;

pub(crate) struct Node {
    pub id: NodeId,
    pub cost_hint: u64,
    pub predecessors: Vec<NodeId>,
    pub body: NodeBody,
}

/// A static set of tasks with declared predecessor lists. Building the graph never runs anything; execution consumes
/// the graph.
pub struct DependencyGraph {
    /// Mapping between caller-chosen node ids and slab keys.
    ids: IdMap<NodeId, usize>,
    /// Node storage.
    nodes: Slab<Node>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl NodeCtx {
    pub(crate) fn new(node_id: NodeId, mut failed_predecessors: Vec<NodeId>) -> Self {
        failed_predecessors.sort();
        failed_predecessors.dedup();
        Self {
            node_id,
            failed_predecessors,
        }
    }

    /// Identifier of the node this context belongs to.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Checks whether any transitive predecessor of this node failed.
    pub fn upstream_failed(&self) -> bool {
        !self.failed_predecessors.is_empty()
    }

    /// Transitive predecessors of this node that failed, in ascending id order.
    pub fn failed_predecessors(&self) -> &[NodeId] {
        &self.failed_predecessors
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            ids: IdMap::default(),
            nodes: Slab::new(),
        }
    }

    /// Registers a node. Predecessors may reference nodes that have not been added yet; those forward references are
    /// checked at validation time. A node depending on itself is rejected immediately.
    pub fn add<F>(&mut self, node_id: NodeId, cost_hint: u64, predecessors: &[NodeId], body: F) -> Result<(), Fail>
    where
        F: FnOnce(&NodeCtx) -> Result<(), Fail> + Send + 'static,
    {
        if predecessors.contains(&node_id) {
            let cause: String = format!("node {} cannot depend on itself", node_id);
            error!("add(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if self.ids.contains(&node_id) {
            let cause: String = format!("node {} was already added", node_id);
            error!("add(): {}", cause);
            return Err(Fail::new(libc::EEXIST, &cause));
        }

        let key: usize = self.nodes.insert(Node {
            id: node_id,
            cost_hint,
            predecessors: predecessors.to_vec(),
            body: Box::new(body),
        });
        // The id was checked above, so the insert cannot collide.
        self.ids.insert(node_id, key);
        trace!("add(): node={} cost_hint={} predecessors={}", node_id, cost_hint, predecessors.len());
        Ok(())
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks the graph and returns a topological order over its nodes. Uses Kahn's algorithm: repeatedly take nodes
    /// with no unprocessed predecessors; if nodes remain when none qualifies, the graph has a cycle and the failure
    /// names one implicated node. A predecessor that was never added fails with its id.
    pub fn validate(&self) -> Result<Vec<NodeId>, Fail> {
        let mut in_degree: Vec<usize> = vec![0; self.nodes.capacity()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.capacity()];

        for (key, node) in self.nodes.iter() {
            for predecessor in &node.predecessors {
                let Some(predecessor_key) = self.ids.get(predecessor) else {
                    let fail: Fail = Fail::unknown_node(predecessor.0);
                    error!("validate(): {:?}", fail);
                    return Err(fail);
                };
                in_degree[key] += 1;
                successors[predecessor_key].push(key);
            }
        }

        let mut ready: VecDeque<usize> = self
            .nodes
            .iter()
            .filter(|(key, _)| in_degree[*key] == 0)
            .map(|(key, _)| key)
            .collect();
        let mut order: Vec<NodeId> = Vec::with_capacity(self.nodes.len());
        while let Some(key) = ready.pop_front() {
            order.push(self.nodes[key].id);
            for &successor in &successors[key] {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    ready.push_back(successor);
                }
            }
        }

        if order.len() != self.nodes.len() {
            // Every remaining node sits on or behind a cycle; name the first one.
            let implicated: NodeId = self
                .nodes
                .iter()
                .filter(|(key, _)| in_degree[*key] > 0)
                .map(|(_, node)| node.id)
                .min()
                .unwrap_or(NodeId(0));
            let fail: Fail = Fail::graph_cycle(implicated.0);
            error!("validate(): {:?}", fail);
            return Err(fail);
        }
        Ok(order)
    }

    pub(crate) fn into_parts(self) -> (IdMap<NodeId, usize>, Slab<Node>) {
        (self.ids, self.nodes)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u64 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
