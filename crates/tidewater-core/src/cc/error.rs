//! Error types for concurrency-control scheduling.

use crate::operator::OperatorError;

/// Errors raised while building or running a scheduler.
#[derive(Debug, thiserror::Error)]
pub enum CcError {
    /// The commit operator is not a mean aggregation.
    #[error("unsupported commit operator {name}: {kind}")]
    UnsupportedCommitOperator {
        /// Operator name.
        name: String,
        /// Operator kind.
        kind: &'static str,
    },

    /// The plan has no operators.
    #[error("empty plan: no operators")]
    EmptyPlan,

    /// An unknown protocol name was given.
    #[error("unknown concurrency control mode: {0}")]
    UnknownMode(String),

    /// An operator failed during `wake_up`.
    #[error("operator {operator} failed: {source}")]
    Evaluation {
        /// Operator name.
        operator: String,
        /// Underlying failure.
        #[source]
        source: OperatorError,
    },
}
