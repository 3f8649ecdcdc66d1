//! Graph Nodes
//!
//! This module defines the untyped node that every signal owns. The node
//! carries everything propagation needs (dirty flag, depth, edges, effects),
//! so the schedulers never have to know the value type of a signal.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::Serialize;

use crate::reactive::EffectId;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered side-effect callback.
pub type EffectFn = Rc<dyn Fn()>;

/// A node in the dependency graph.
///
/// Edges are weak in both directions. A node is kept alive only by the
/// signal that owns it; dead entries are pruned the next time the edge set
/// is walked.
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// Length of the longest chain of sources below this node.
    depth: Cell<usize>,

    /// Whether the owning signal must recompute before its next read.
    dirty: Cell<bool>,

    /// Nodes this node read from during its last computation.
    sources: RefCell<IndexMap<NodeId, Weak<Node>>>,

    /// Nodes that read this node during their last computation.
    listeners: RefCell<IndexMap<NodeId, Weak<Node>>>,

    /// Change callbacks, owned by the node, in registration order.
    effects: RefCell<IndexMap<EffectId, EffectFn>>,
}

impl Node {
    /// Create a new node. Nodes start dirty so the first read computes.
    pub fn new() -> Self {
        Self {
            id: NodeId::new(),
            depth: Cell::new(0),
            dirty: Cell::new(true),
            sources: RefCell::new(IndexMap::new()),
            listeners: RefCell::new(IndexMap::new()),
            effects: RefCell::new(IndexMap::new()),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's topological depth.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn mark_clean(&self) {
        self.dirty.set(false);
    }

    /// Add a listener (a node that reads from this node).
    pub fn add_listener(&self, listener: &Rc<Node>) {
        self.listeners
            .borrow_mut()
            .insert(listener.id, Rc::downgrade(listener));
    }

    /// Remove a listener.
    pub fn remove_listener(&self, id: NodeId) {
        self.listeners.borrow_mut().shift_remove(&id);
    }

    /// Add a source (a node that this node reads from).
    ///
    /// Depth only ever grows here; it is reset by `remove_all_sources`.
    pub fn add_source(&self, source: &Rc<Node>) {
        self.sources
            .borrow_mut()
            .insert(source.id, Rc::downgrade(source));
        self.depth.set(self.depth.get().max(source.depth() + 1));
    }

    /// Remove a single source edge without touching depth.
    pub fn remove_source(&self, id: NodeId) {
        self.sources.borrow_mut().shift_remove(&id);
    }

    /// Detach every source, removing this node from each source's listeners.
    pub fn remove_all_sources(&self) {
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for source in sources.values().filter_map(Weak::upgrade) {
            source.remove_listener(self.id);
        }
        self.depth.set(0);
    }

    /// Detach every listener, removing this node from each listener's sources.
    pub fn remove_all_listeners(&self) {
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners.values().filter_map(Weak::upgrade) {
            listener.remove_source(self.id);
        }
    }

    /// Live listeners, in the order they subscribed.
    pub fn listeners(&self) -> Vec<Rc<Node>> {
        live_edges(&self.listeners)
    }

    /// Live sources, in the order they were read.
    pub fn sources(&self) -> Vec<Rc<Node>> {
        live_edges(&self.sources)
    }

    pub fn has_listener(&self, id: NodeId) -> bool {
        is_live(&self.listeners, id)
    }

    pub fn has_source(&self, id: NodeId) -> bool {
        is_live(&self.sources, id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    pub fn source_count(&self) -> usize {
        self.sources().len()
    }

    /// Register a change callback.
    pub fn add_effect(&self, id: EffectId, effect: EffectFn) {
        self.effects.borrow_mut().insert(id, effect);
    }

    /// Remove a change callback. Returns whether it was registered.
    pub fn remove_effect(&self, id: EffectId) -> bool {
        self.effects.borrow_mut().shift_remove(&id).is_some()
    }

    pub fn clear_effects(&self) {
        self.effects.borrow_mut().clear();
    }

    /// Snapshot of the registered callbacks.
    pub fn effects(&self) -> Vec<(EffectId, EffectFn)> {
        self.effects
            .borrow()
            .iter()
            .map(|(id, effect)| (*id, Rc::clone(effect)))
            .collect()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.borrow().len()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("dirty", &self.is_dirty())
            .field("sources", &self.sources.borrow().keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.borrow().keys().collect::<Vec<_>>())
            .field("effects", &self.effect_count())
            .finish()
    }
}

/// Upgrade every live entry, dropping the dead ones from the set.
fn live_edges(edges: &RefCell<IndexMap<NodeId, Weak<Node>>>) -> Vec<Rc<Node>> {
    let mut edges = edges.borrow_mut();
    let mut live = Vec::with_capacity(edges.len());
    edges.retain(|_, weak| match weak.upgrade() {
        Some(node) => {
            live.push(node);
            true
        }
        None => false,
    });
    live
}

fn is_live(edges: &RefCell<IndexMap<NodeId, Weak<Node>>>, id: NodeId) -> bool {
    edges
        .borrow()
        .get(&id)
        .map_or(false, |weak| weak.strong_count() > 0)
}
