//! Static identification of the commit operator.
//!
//! The commit operator is the aggregation whose consistent evaluation marks
//! a transaction boundary. The finder walks the tree once, leaves first,
//! counting resource-reference operators below every node, and keeps the
//! aggregation enclosing the most relation reads.

use std::cell::OnceCell;

use super::error::CcError;
use crate::operator::{OperatorId, OperatorShape, OperatorTree};

/// Finds and memoizes the commit operator of one plan.
#[derive(Debug)]
pub struct CommitOperatorFinder<'a> {
    tree: &'a OperatorTree,
    root: OperatorId,
    found: OnceCell<Option<OperatorId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Aggregation(OperatorId),
    Join(OperatorId),
}

impl Candidate {
    fn id(self) -> OperatorId {
        match self {
            Self::Aggregation(id) | Self::Join(id) => id,
        }
    }
}

#[derive(Debug, Default)]
struct Search {
    best: usize,
    candidate: Option<Candidate>,
}

impl Search {
    /// An equal count only displaces a join candidate.
    fn improves(&self, count: usize) -> bool {
        count > self.best
            || (count == self.best && matches!(self.candidate, Some(Candidate::Join(_))))
    }

    fn visit(&mut self, tree: &OperatorTree, id: OperatorId) -> usize {
        let Some(op) = tree.get(id) else {
            return 0;
        };
        match op.shape() {
            OperatorShape::Source { .. } => 0,
            OperatorShape::Single { parent, .. } => {
                let count = self.visit(tree, *parent);
                if op.is_resource_reference() {
                    return count + 1;
                }
                if op.is_aggregation() && count > 0 && self.improves(count) {
                    self.best = count;
                    self.candidate = Some(Candidate::Aggregation(id));
                }
                count
            }
            OperatorShape::Double { left, right, .. } => {
                let left = self.visit(tree, *left);
                let right = self.visit(tree, *right);
                let count = left + right;
                if left > 0 && right > 0 && self.improves(count) {
                    self.best = count;
                    self.candidate = Some(Candidate::Join(id));
                }
                count
            }
        }
    }
}

impl<'a> CommitOperatorFinder<'a> {
    /// Creates a finder over the subtree rooted at `root`.
    #[must_use]
    pub fn new(tree: &'a OperatorTree, root: OperatorId) -> Self {
        Self {
            tree,
            root,
            found: OnceCell::new(),
        }
    }

    /// Returns the commit operator, or `None` if no operator reads a relation.
    ///
    /// The search runs once; later calls return the memoized result.
    #[must_use]
    pub fn commit_operator(&self) -> Option<OperatorId> {
        *self.found.get_or_init(|| {
            let mut search = Search::default();
            search.visit(self.tree, self.root);
            search.candidate.map(Candidate::id)
        })
    }

    /// Returns the commit operator after checking that it is a mean
    /// aggregation, the only kind that can close a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CcError::UnsupportedCommitOperator`] for any other kind.
    pub fn validated(&self) -> Result<Option<OperatorId>, CcError> {
        let Some(id) = self.commit_operator() else {
            return Ok(None);
        };
        let op = &self.tree[id];
        if op.aggregation().is_some_and(|agg| agg.is_mean()) {
            Ok(Some(id))
        } else {
            Err(CcError::UnsupportedCommitOperator {
                name: op.name().to_string(),
                kind: op.kind_name(),
            })
        }
    }

    /// Returns `true` if the commit operator reads a relation through
    /// pass-through operators only, with no window in between.
    ///
    /// When it does, the relation reads of a transaction happen inside the
    /// commit operator's own window, so releasing the transaction must also
    /// replay that window.
    #[must_use]
    pub fn commit_operator_overlaps(&self) -> bool {
        let Some(commit) = self.commit_operator() else {
            return false;
        };
        let mut stack = self.tree[commit].parents();
        while let Some(id) = stack.pop() {
            let op = &self.tree[id];
            if op.is_resource_reference() {
                return true;
            }
            if !op.is_window_operator() {
                stack.extend(op.parents());
            }
        }
        false
    }
}
