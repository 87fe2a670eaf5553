//! Arena of operators addressed by [`OperatorId`].

use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

use super::{Operator, OperatorBody, OperatorId};

/// All operators of one query, indexed by `OperatorId.0`.
#[derive(Debug, Default)]
pub struct OperatorTree {
    operators: Vec<Operator>,
}

impl OperatorTree {
    pub(crate) fn new(operators: Vec<Operator>) -> Self {
        debug_assert!(operators
            .iter()
            .enumerate()
            .all(|(i, op)| op.id().0 as usize == i));
        Self { operators }
    }

    /// Returns the number of operators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Returns `true` if the tree has no operators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Returns the operator with `id`.
    #[must_use]
    pub fn get(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(id.0 as usize)
    }

    /// Iterates all operators in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Operator> {
        self.operators.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Operator> {
        self.operators.iter_mut()
    }

    /// Returns the operators reachable from `root`, upstream first.
    ///
    /// Parents are visited left before right, and every operator comes
    /// after all of its parents.
    #[must_use]
    pub fn post_order(&self, root: OperatorId) -> Vec<OperatorId> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let Some(op) = self.get(id) else {
                continue;
            };
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for parent in op.parents().into_iter().rev() {
                stack.push((parent, false));
            }
        }
        order
    }

    /// Returns `true` if `id` is `root` or one of its ancestors.
    #[must_use]
    pub fn contains(&self, root: OperatorId, id: OperatorId) -> bool {
        self.post_order(root).contains(&id)
    }

    /// Renders the subtree under `root` as an indented listing.
    #[must_use]
    pub fn dump(&self, root: OperatorId) -> String {
        let mut out = String::new();
        self.dump_into(root, 0, &mut out);
        out
    }

    fn dump_into(&self, id: OperatorId, depth: usize, out: &mut String) {
        let Some(op) = self.get(id) else {
            return;
        };
        let _ = write!(out, "{:indent$}{} [{}]", "", op.name(), op.kind_name(), indent = depth * 2);
        if let Some(agg) = op.aggregation() {
            let _ = write!(out, " {}", agg.window());
        }
        if let Some(reference) = op.reference() {
            let names: Vec<&str> = reference.relations().iter().map(|r| r.name()).collect();
            let _ = write!(out, " <- {}", names.join(", "));
        }
        if op.is_commit_operator() {
            out.push_str(" (commit)");
        }
        out.push('\n');
        for parent in op.parents() {
            self.dump_into(parent, depth + 1, out);
        }
    }

    /// Renders the subtree under `root` in Graphviz DOT format.
    ///
    /// Edges point downstream, from each parent to its consumer.
    #[must_use]
    pub fn to_dot(&self, root: OperatorId) -> String {
        let mut out = String::from("digraph query {\n  rankdir=BT;\n");
        for id in self.post_order(root) {
            let Some(op) = self.get(id) else {
                continue;
            };
            let shape = match op.body() {
                OperatorBody::StreamAdapter => "box",
                OperatorBody::RelationJoin(_) => "house",
                _ if op.is_window_operator() => "doubleoctagon",
                _ => "ellipse",
            };
            let style = if op.is_commit_operator() {
                ", style=bold"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  n{} [label=\"{}\\n{}\", shape={shape}{style}];",
                id.0,
                op.name(),
                op.kind_name()
            );
            if let Some(reference) = op.reference() {
                for relation in reference.relations() {
                    let _ = writeln!(
                        out,
                        "  \"rel_{name}\" [label=\"{name}\", shape=cylinder];\n  \"rel_{name}\" -> n{id} [style=dashed];",
                        name = relation.name(),
                        id = id.0
                    );
                }
            }
            for parent in op.parents() {
                let _ = writeln!(out, "  n{} -> n{};", parent.0, id.0);
            }
        }
        out.push_str("}\n");
        out
    }
}

impl Index<OperatorId> for OperatorTree {
    type Output = Operator;

    fn index(&self, id: OperatorId) -> &Operator {
        &self.operators[id.0 as usize]
    }
}

impl IndexMut<OperatorId> for OperatorTree {
    fn index_mut(&mut self, id: OperatorId) -> &mut Operator {
        &mut self.operators[id.0 as usize]
    }
}
