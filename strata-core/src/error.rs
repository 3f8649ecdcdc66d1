//! Error types for the reactive runtime.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised while reading or writing signals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A signal was re-entered while its own producer was still running.
    ///
    /// `path` lists the signals that were being evaluated when the cycle was
    /// detected, outermost first.
    #[error("cyclic dependency: signal {signal} is already being computed (evaluation stack: {})", format_path(.path))]
    CyclicDependency {
        /// The signal that was entered a second time.
        signal: NodeId,
        /// The evaluation stack at detection time.
        path: Vec<NodeId>,
    },

    /// A signal was read or written from inside its own `modify` closure,
    /// while its value was exclusively borrowed.
    #[error("signal {signal} is being modified in place and cannot be accessed")]
    ModifiedInPlace {
        /// The signal whose `modify` closure is running.
        signal: NodeId,
    },
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for reactive operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;
