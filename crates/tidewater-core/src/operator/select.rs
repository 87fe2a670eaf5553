//! Stateless selection and projection.

use std::sync::Arc;

use super::condition::Condition;
use super::OperatorError;
use crate::schema::SchemaRef;
use crate::tuple::{merge_stamps, Tuple, TupleRef};

/// Filters tuples by a condition and tracks selectivity.
#[derive(Debug, Clone)]
pub struct Selection {
    condition: Condition,
    seen: u64,
    passed: u64,
}

impl Selection {
    /// Creates a selection.
    #[must_use]
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            seen: 0,
            passed: 0,
        }
    }

    /// Returns the condition.
    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Fraction of inspected tuples that passed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn selectivity(&self) -> Option<f64> {
        (self.seen > 0).then(|| self.passed as f64 / self.seen as f64)
    }

    pub(crate) fn filter(&mut self, tuple: &Tuple) -> Result<bool, OperatorError> {
        self.seen += 1;
        let pass = self.condition.check(tuple)?;
        if pass {
            self.passed += 1;
        }
        Ok(pass)
    }
}

/// Keeps a fixed list of attributes, resolved when the plan is built.
#[derive(Debug, Clone)]
pub struct Projection {
    indices: Vec<usize>,
}

impl Projection {
    /// Creates a projection over attribute positions.
    #[must_use]
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// Returns the kept positions.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub(crate) fn project(
        &self,
        tuple: &TupleRef,
        schema: &SchemaRef,
    ) -> Result<TupleRef, OperatorError> {
        let values = self
            .indices
            .iter()
            .map(|&i| {
                tuple
                    .value(i)
                    .cloned()
                    .ok_or_else(|| OperatorError::UnknownAttribute(format!("#{i}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Tuple::derived(
            Arc::clone(schema),
            values,
            tuple.arrived_at(),
            tuple.lwm(),
            merge_stamps([tuple]),
        ))
    }
}
