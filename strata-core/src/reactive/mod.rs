//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, the runtime
//! that propagates their changes, and the effects that run afterwards.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for state. It holds either a literal value or a
//! producer function. When a signal is read while another signal's producer
//! is running, the reader becomes a listener of the signal that was read.
//!
//! ## Derived Signals
//!
//! A signal built from a producer caches its result and re-evaluates only
//! after one of its sources changed, and only when it is read again.
//!
//! ## Effects
//!
//! An effect is a callback registered on a signal with
//! [`Signal::on_change`]. Effects never run inside a write: they are
//! collected while a change propagates and flushed later, in one batch, on
//! the runtime's task queue.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic. Each [`Runtime`] owns a
//! [`ComputationContext`]; a signal reading itself while it is still on that
//! stack is a cycle and is reported as
//! [`ReactiveError::CyclicDependency`](crate::error::ReactiveError).

mod context;
mod effect;
mod observe;
mod runtime;
mod signal;

pub use context::{ComputationContext, Frame};
pub use effect::{
    EffectId, EffectPanicPolicy, EffectScheduler, Task, TaskQueue, TickQueue, TokioLocalQueue,
};
pub use observe::{ObservedMut, Observer, OnMutate};
pub use runtime::{Runtime, RuntimeBuilder};
pub use signal::{Signal, SignalInfo};
