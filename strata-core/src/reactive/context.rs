//! Computation Context
//!
//! The computation context tracks which signal is currently being
//! recomputed. This enables automatic dependency tracking: when a signal is
//! read, the signal on top of the stack becomes one of its listeners.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one stack. Before a producer runs,
//! its signal is pushed; the returned [`Frame`] pops it again when dropped,
//! so the stack stays balanced even if the producer panics.
//!
//! Entering a signal that is already on the stack is how cycles show up at
//! runtime, so [`ComputationContext::enter`] refuses it with
//! [`ReactiveError::CyclicDependency`].

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{ReactiveError, Result};
use crate::graph::{Node, NodeId};

/// Stack of signals whose producers are currently running.
#[derive(Default)]
pub struct ComputationContext {
    stack: RefCell<SmallVec<[Rc<Node>; 8]>>,
}

impl ComputationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `node` and return a guard that pops it on drop.
    ///
    /// Fails if `node` is already being evaluated.
    pub fn enter(&self, node: &Rc<Node>) -> Result<Frame<'_>> {
        if self.contains(node.id()) {
            let path = self.path();
            tracing::warn!(signal = %node.id(), ?path, "cyclic dependency detected");
            return Err(ReactiveError::CyclicDependency {
                signal: node.id(),
                path,
            });
        }

        self.push(Rc::clone(node));
        Ok(Frame {
            context: self,
            id: node.id(),
        })
    }

    pub fn push(&self, node: Rc<Node>) {
        self.stack.borrow_mut().push(node);
    }

    pub fn pop(&self) -> Option<Rc<Node>> {
        self.stack.borrow_mut().pop()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.borrow().is_empty()
    }

    /// The signal whose producer is running right now, if any.
    pub fn current(&self) -> Option<Rc<Node>> {
        self.stack.borrow().last().cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.stack.borrow().iter().any(|node| node.id() == id)
    }

    /// Ids on the stack, outermost first.
    pub fn path(&self) -> Vec<NodeId> {
        self.stack.borrow().iter().map(|node| node.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.stack.borrow().len()
    }
}

/// Guard that pops the context when dropped.
pub struct Frame<'a> {
    context: &'a ComputationContext,
    id: NodeId,
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        let popped = self.context.pop();

        // Verify we're popping the right frame.
        if let Some(node) = popped {
            debug_assert_eq!(
                node.id(),
                self.id,
                "ComputationContext mismatch: expected {}, got {}",
                self.id,
                node.id()
            );
        }
    }
}
