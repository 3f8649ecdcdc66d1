//! Strata Core
//!
//! This crate provides a fine-grained reactive state runtime. It implements:
//!
//! - Signals holding literal values or derived from other signals
//! - Automatic dependency tracking with cycle detection
//! - Depth-ordered change propagation with lazy recomputation
//! - Batched, deferred change effects
//! - Detection of in-place mutation of held values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Dependency graph nodes and the notification scheduler
//! - `reactive`: Signals, the runtime, effects and the mutation observer
//! - `error`: Error types
//!
//! Everything is single-threaded. A [`Runtime`] and the signals created on
//! it share `Rc` handles and must stay on one thread.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use strata_core::Runtime;
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let count = runtime.signal(1);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     runtime.computed(move || count.get() * 2)
//! };
//! assert_eq!(doubled.get(), 2);
//!
//! // Register an effect
//! let seen = Rc::new(Cell::new(0));
//! {
//!     let (doubled_in_effect, seen) = (doubled.clone(), Rc::clone(&seen));
//!     doubled.on_change(move || seen.set(doubled_in_effect.get()));
//! }
//!
//! // Update the signal; effects run once the task queue is drained
//! count.set(5);
//! count.set(6);
//! runtime.run_until_idle();
//! assert_eq!(seen.get(), 12);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result};
pub use reactive::{EffectPanicPolicy, Runtime, RuntimeBuilder, Signal, SignalInfo};
