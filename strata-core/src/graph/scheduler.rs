//! Notification Scheduler
//!
//! The scheduler determines the order in which "a source changed"
//! notifications reach dependent nodes. It ensures that shallower nodes are
//! always notified before deeper ones.
//!
//! # Algorithm
//!
//! Pending nodes live in one queue kept sorted ascending by depth:
//!
//! 1. `schedule_signal` binary-searches for the slot after every queued node
//!    of the same or lower depth and inserts there, so equal depths keep
//!    their enqueue order.
//! 2. A membership set turns repeated schedules of the same node within a
//!    wave into no-ops.
//! 3. `execute` pops the shallowest node and hands it to the caller's
//!    handler, which may schedule more nodes (re-entrantly).
//!
//! Draining with `execute` until it returns `false` visits a diamond's
//! common descendant exactly once, after both of its parents.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use super::node::{Node, NodeId};

/// A queued node together with its depth at schedule time.
struct Pending {
    depth: usize,
    node: Rc<Node>,
}

/// Depth-ordered queue of nodes waiting for a source-changed notification.
#[derive(Default)]
pub struct NotificationScheduler {
    queue: RefCell<VecDeque<Pending>>,
    queued: RefCell<HashSet<NodeId>>,
}

impl NotificationScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node for notification. No-op if it is already queued.
    pub fn schedule_signal(&self, node: Rc<Node>) {
        if !self.queued.borrow_mut().insert(node.id()) {
            return;
        }

        let depth = node.depth();
        let mut queue = self.queue.borrow_mut();
        let position = queue.partition_point(|pending| pending.depth <= depth);
        tracing::trace!(signal = %node.id(), depth, position, "signal scheduled");
        queue.insert(position, Pending { depth, node });
    }

    /// Notify the shallowest queued node.
    ///
    /// The node is removed from the queue before `on_source_changed` runs,
    /// so the handler may schedule it again. Returns `false` once the queue
    /// is empty.
    pub fn execute<F>(&self, on_source_changed: F) -> bool
    where
        F: FnOnce(&Rc<Node>),
    {
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some(pending) => {
                self.queued.borrow_mut().remove(&pending.node.id());
                on_source_changed(&pending.node);
                true
            }
            None => false,
        }
    }

    /// Whether `id` is waiting in the queue.
    pub fn is_scheduled(&self, id: NodeId) -> bool {
        self.queued.borrow().contains(&id)
    }

    /// Get the number of queued nodes.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
