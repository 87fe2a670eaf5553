//! # Tidewater Core
//!
//! Streaming query engine that keeps windowed aggregates consistent with
//! relations updated while the query runs.
//!
//! This crate provides:
//! - **Data model**: values, schemas, version-stamped tuples, relations and
//!   replayable streams
//! - **Windows**: tuple- and time-based synopses with water marks
//! - **Operators**: selection, projection, relation and window joins, mean
//!   and election aggregates
//! - **Plans**: a fluent query builder producing an operator tree
//! - **Concurrency control**: no-CC, optimistic redo, two-phase locking and
//!   snapshot isolation schedulers
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidewater_core::cc::{build_scheduler, CcMode, SchedulerConfig};
//! use tidewater_core::plan::QueryBuilder;
//!
//! let query = QueryBuilder::new()
//!     .relation("goods", goods_schema)
//!     .stream("purchases", purchase_schema)
//!     .combine("priced", "purchases", "goods", condition)
//!     .mean("avg_price", "priced", "price", Window::tuples(5, 5))
//!     .build()?;
//! let purchases = query.input_stream("purchases").cloned();
//! let mut scheduler = build_scheduler(
//!     query.into_plan("avg_price")?,
//!     &SchedulerConfig::with_mode(CcMode::Optimistic),
//! )?;
//! scheduler.wake_up()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cc;
pub mod operator;
pub mod plan;
pub mod relation;
pub mod runtime;
pub mod schema;
pub mod stream;
pub mod tuple;
pub mod value;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use cc::{build_scheduler, CcMode, CcScheduler, SchedulerConfig};
pub use plan::{QueryBuilder, QueryContainer, QueryPlan};
pub use runtime::QueryProcessor;

/// Result type for tidewater-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tidewater-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Value arithmetic or comparison errors
    #[error("Operation error: {0}")]
    Operation(#[from] value::OperationError),

    /// Tuple construction errors
    #[error("Tuple error: {0}")]
    Tuple(#[from] tuple::TupleError),

    /// Query construction errors
    #[error("Plan error: {0}")]
    Plan(#[from] plan::PlanError),

    /// Operator evaluation errors
    #[error("Operator error: {0}")]
    Operator(#[from] operator::OperatorError),

    /// Scheduler errors
    #[error("Concurrency control error: {0}")]
    Cc(#[from] cc::CcError),
}
