//! Binding Graph
//!
//! This module tracks the binding relationships between reactive variables.
//!
//! # Overview
//!
//! - Nodes represent reactive variables (triggers, indicators, adapters).
//! - An edge `A -> B` means B is bound to A: writes to A (or reads of B, for
//!   delayed bindings) move a value from A into B.
//!
//! Every variable registers a node when it is created and removes it when
//! its last handle is dropped. Binding registration adds an edge and is
//! refused if the edge would close a cycle, which keeps propagation finite.
//!
//! The process-wide graph lives behind [`registry`]. It is only written
//! during registration and variable teardown, never on the value path.

mod binding_graph;
mod node;

use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::trace;

pub use binding_graph::BindingGraph;
pub use node::{Node, NodeId, NodeKind};

use crate::error::ReactorResult;

static REGISTRY: OnceLock<RwLock<BindingGraph>> = OnceLock::new();

/// The process-wide binding graph.
pub fn registry() -> &'static RwLock<BindingGraph> {
    REGISTRY.get_or_init(|| RwLock::new(BindingGraph::new()))
}

/// Register a new variable of `kind`.
pub(crate) fn register(kind: NodeKind) -> NodeId {
    registry().write().add_node(kind)
}

pub(crate) fn unregister(id: NodeId) {
    registry().write().remove_node(id);
}

/// Record the edge `source -> dependent`, refusing cycles.
pub(crate) fn link(source: NodeId, dependent: NodeId) -> ReactorResult<()> {
    registry().write().add_edge(source, dependent)?;
    trace!(%source, %dependent, "binding registered");
    Ok(())
}

/// Nodes reachable from `source`, in propagation-safe order.
pub fn downstream(source: NodeId) -> Vec<NodeId> {
    registry().read().downstream(source)
}
