//! Operators and streams rewound when a transaction is redone.

use std::sync::Arc;

use crate::operator::{OperatorId, OperatorShape, OperatorTree};
use crate::stream::StreamRef;

/// Operators whose window state is reset on abort, and the upstream streams
/// that keep a replay backup so the reset windows can be rebuilt.
///
/// Both lists are computed once per plan and kept in discovery order.
#[derive(Debug, Clone, Default)]
pub struct RedoArea {
    operators: Vec<OperatorId>,
    streams: Vec<StreamRef>,
}

impl RedoArea {
    /// Computes the redo area of the subtree rooted at `root`.
    #[must_use]
    pub fn find(tree: &OperatorTree, root: OperatorId) -> Self {
        let mut area = Self::default();
        area.setup(tree, root, false);
        area
    }

    /// Visits `id` and returns `true` if a resource-reference operator sits
    /// at or above it.
    fn setup(&mut self, tree: &OperatorTree, id: OperatorId, downstream_has_window: bool) -> bool {
        let Some(op) = tree.get(id) else {
            return false;
        };
        match op.shape() {
            OperatorShape::Source { .. } => false,
            OperatorShape::Single { parent, input } => {
                let mut upstream =
                    self.setup(tree, *parent, downstream_has_window || op.is_window_operator());
                if op.is_resource_reference() && !upstream && downstream_has_window {
                    // Relation reads are redone from the replayed input.
                    self.streams.push(Arc::clone(input));
                    upstream = true;
                }
                if upstream && (downstream_has_window || op.is_aggregation()) {
                    self.operators.push(id);
                }
                upstream
            }
            OperatorShape::Double {
                left,
                right,
                left_input,
                right_input,
            } => {
                let propagate = downstream_has_window || op.is_window_operator();
                let left_up = self.setup(tree, *left, propagate);
                let right_up = self.setup(tree, *right, propagate);
                if op.is_window_operator() && (left_up || right_up) && propagate {
                    if !left_up {
                        self.streams.push(Arc::clone(left_input));
                    } else if !right_up {
                        self.streams.push(Arc::clone(right_input));
                    }
                    self.operators.push(id);
                }
                left_up || right_up
            }
        }
    }

    /// Operators reset on abort, upstream first.
    #[must_use]
    pub fn operators(&self) -> &[OperatorId] {
        &self.operators
    }

    /// Streams that retain a replay backup.
    #[must_use]
    pub fn streams(&self) -> &[StreamRef] {
        &self.streams
    }

    /// Returns `true` if `id` is reset on abort.
    #[must_use]
    pub fn contains(&self, id: OperatorId) -> bool {
        self.operators.contains(&id)
    }

    /// Returns `true` if nothing needs to be rewound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty() && self.streams.is_empty()
    }

    /// Turns on replay backup for every stream in the area.
    pub(crate) fn protect(&self) {
        for stream in &self.streams {
            stream.set_backed_up(true);
        }
    }
}
