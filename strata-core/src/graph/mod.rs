//! Dependency Graph
//!
//! This module implements the dependency graph that connects signals.
//!
//! # Overview
//!
//! The graph is directed: if B read A during its last computation, A lists B
//! as a listener and B lists A as a source. The two edge sets are always the
//! transpose of each other.
//!
//! # Design Decisions
//!
//! 1. The graph is distributed: every signal owns a [`Node`] holding its own
//!    edges, instead of one central adjacency map. Signals that are dropped
//!    disappear from the graph without explicit unregistration.
//!
//! 2. Edges are weak references. A node is pruned from its peers' edge sets
//!    lazily, the next time a peer walks them.
//!
//! 3. Propagation order comes from each node's depth (its longest chain of
//!    sources), consumed by the [`NotificationScheduler`].

mod node;
mod scheduler;

pub use node::{EffectFn, Node, NodeId};
pub use scheduler::NotificationScheduler;
