//! Query container and executable plans.

use std::sync::Arc;

use fxhash::FxHashMap;

use super::error::PlanError;
use crate::operator::{Operator, OperatorId, OperatorTree};
use crate::relation::RelationRef;
use crate::stream::StreamRef;
use crate::tuple::LogicalClock;

/// Everything a built query owns: relations, streams, operators, clock.
///
/// Handles to relations and streams are shared, so callers can keep them
/// to feed inputs, mutate relations or drain results after the operator
/// tree has moved into a scheduler through [`QueryContainer::into_plan`].
#[derive(Debug)]
pub struct QueryContainer {
    tree: OperatorTree,
    names: FxHashMap<String, OperatorId>,
    relations: FxHashMap<String, RelationRef>,
    inputs: FxHashMap<String, StreamRef>,
    clock: Arc<LogicalClock>,
}

impl QueryContainer {
    pub(crate) fn new(
        tree: OperatorTree,
        names: FxHashMap<String, OperatorId>,
        relations: FxHashMap<String, RelationRef>,
        inputs: FxHashMap<String, StreamRef>,
        clock: Arc<LogicalClock>,
    ) -> Self {
        Self {
            tree,
            names,
            relations,
            inputs,
            clock,
        }
    }

    /// Returns the relation called `name`.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationRef> {
        self.relations.get(name)
    }

    /// Iterates all relations.
    pub fn relations(&self) -> impl Iterator<Item = &RelationRef> {
        self.relations.values()
    }

    /// Returns the external input stream feeding the adapter `name`.
    #[must_use]
    pub fn input_stream(&self, name: &str) -> Option<&StreamRef> {
        self.inputs.get(name)
    }

    /// Returns the output stream of the operator `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamRef> {
        self.operator(name).map(Operator::output)
    }

    /// Returns the id of the operator `name`.
    #[must_use]
    pub fn operator_id(&self, name: &str) -> Option<OperatorId> {
        self.names.get(name).copied()
    }

    /// Returns the operator `name`.
    #[must_use]
    pub fn operator(&self, name: &str) -> Option<&Operator> {
        self.operator_id(name).and_then(|id| self.tree.get(id))
    }

    /// Returns the operator tree.
    #[must_use]
    pub fn tree(&self) -> &OperatorTree {
        &self.tree
    }

    /// Returns the clock used to stamp arrivals.
    #[must_use]
    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    /// Consumes the container into a plan rooted at operator `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownOperator`] if `root` is not declared.
    pub fn into_plan(self, root: &str) -> Result<QueryPlan, PlanError> {
        let root = self
            .operator_id(root)
            .ok_or_else(|| PlanError::UnknownOperator(root.to_string()))?;
        Ok(QueryPlan {
            tree: self.tree,
            root,
        })
    }
}

/// An operator tree with a designated root, ready to be scheduled.
#[derive(Debug)]
pub struct QueryPlan {
    tree: OperatorTree,
    root: OperatorId,
}

impl QueryPlan {
    /// Returns the root operator id.
    #[must_use]
    pub fn root(&self) -> OperatorId {
        self.root
    }

    /// Returns the operator tree.
    #[must_use]
    pub fn tree(&self) -> &OperatorTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut OperatorTree {
        &mut self.tree
    }

    /// Returns the root operator.
    #[must_use]
    pub fn root_operator(&self) -> &Operator {
        &self.tree[self.root]
    }

    /// Returns the operators reachable from the root, upstream first.
    #[must_use]
    pub fn operators(&self) -> Vec<OperatorId> {
        self.tree.post_order(self.root)
    }

    /// Renders the plan as an indented listing.
    #[must_use]
    pub fn dump(&self) -> String {
        self.tree.dump(self.root)
    }

    /// Renders the plan in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        self.tree.to_dot(self.root)
    }
}
