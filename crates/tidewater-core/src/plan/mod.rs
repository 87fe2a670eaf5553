//! # Query Plans
//!
//! Construction of operator trees from named declarations.
//!
//! [`QueryBuilder`] collects stream, relation and operator declarations and
//! links them into a [`QueryContainer`]. The container owns relations,
//! input streams and the operator arena; [`QueryContainer::into_plan`]
//! selects the root operator and yields the [`QueryPlan`] a scheduler runs.

mod builder;
mod container;
mod error;

pub use builder::QueryBuilder;
pub use container::{QueryContainer, QueryPlan};
pub use error::PlanError;

#[cfg(test)]
mod tests;
