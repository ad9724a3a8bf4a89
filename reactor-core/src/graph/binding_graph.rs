//! Binding Graph
//!
//! Records which reactive variables are bound to which. Propagation itself
//! never consults the graph; it exists so that registration can refuse an
//! edge that would close a cycle, and so callers can inspect what a write
//! reaches.
//!
//! # Algorithm
//!
//! Adding the edge `source -> dependent` is rejected when `source` is already
//! reachable from `dependent` (a breadth-first walk over dependents). With
//! that check in place the graph stays acyclic, so `downstream` can return a
//! topological order via Kahn's algorithm.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{trace, warn};

use super::node::{Node, NodeId, NodeKind};
use crate::error::{ReactorError, ReactorResult};

/// The binding graph: every live reactive variable and its binding edges.
#[derive(Debug, Default)]
pub struct BindingGraph {
    nodes: HashMap<NodeId, Node>,
}

impl BindingGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Create a node of the given kind and return its ID.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let node = Node::new(kind);
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            trace!(node = %node_id, kind = ?node.kind(), "node removed");
            for dep_id in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Add the edge `source -> dependent`.
    ///
    /// Fails with [`ReactorError::Cycle`] if `source` is reachable from
    /// `dependent` (including `source == dependent`); the graph is left
    /// unchanged in that case.
    pub fn add_edge(&mut self, source: NodeId, dependent: NodeId) -> ReactorResult<()> {
        if self.reaches(dependent, source) {
            warn!(%source, %dependent, "rejecting binding that would create a cycle");
            return Err(ReactorError::Cycle {
                from: source,
                to: dependent,
            });
        }

        if let Some(node) = self.nodes.get_mut(&source) {
            node.add_dependent(dependent);
        }
        if let Some(node) = self.nodes.get_mut(&dependent) {
            node.add_dependency(source);
        }
        Ok(())
    }

    /// Whether `to` can be reached from `from` by following dependent edges.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            for &dependent in node.dependents() {
                if dependent == to {
                    return true;
                }
                queue.push_back(dependent);
            }
        }

        false
    }

    /// Every node reachable from `source`, sources before their dependents.
    pub fn downstream(&self, source: NodeId) -> Vec<NodeId> {
        let mut reached = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(node) = self.nodes.get(&source) {
            queue.extend(node.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                reached.push(node_id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(reached)
    }

    /// Kahn's algorithm restricted to `nodes`.
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent_id);
                        }
                    }
                }
            }
        }

        result
    }
}
