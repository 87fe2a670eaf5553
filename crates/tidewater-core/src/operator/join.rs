//! Stream-relation and window-window joins.

use std::sync::Arc;

use super::condition::Condition;
use super::reference::RelationAccess;
use super::OperatorError;
use crate::relation::Relation;
use crate::schema::SchemaRef;
use crate::tuple::{merge_stamps, set_stamp, Tuple, TupleRef};
use crate::window::{Synopsis, Window};

/// Joins each stream tuple with the matching rows of a relation.
///
/// Every output carries the relation version that was current while the
/// rows were read, on top of the stamps of the input tuple.
#[derive(Debug, Clone)]
pub struct RelationJoin {
    condition: Condition,
}

impl RelationJoin {
    /// Creates a relation join.
    #[must_use]
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }

    /// Returns the join condition.
    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Joins `input` against `relation`, returning the combined tuples.
    pub(crate) fn probe(
        &self,
        input: &TupleRef,
        relation: &Relation,
        schema: &SchemaRef,
        access: &mut RelationAccess,
    ) -> Result<Vec<TupleRef>, OperatorError> {
        let id = relation.id();
        access.read(relation, |rows, version| {
            let mut out = Vec::new();
            for row in rows {
                if !self.condition.check_pair(input, row)? {
                    continue;
                }
                let mut values = Vec::with_capacity(input.values().len() + row.values().len());
                values.extend_from_slice(input.values());
                values.extend_from_slice(row.values());
                let mut versions = merge_stamps([input]);
                set_stamp(&mut versions, id, version);
                out.push(Tuple::derived(
                    Arc::clone(schema),
                    values,
                    input.arrived_at(),
                    input.lwm(),
                    versions,
                ));
            }
            Ok(out)
        })
    }
}

/// Side of a double-input operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left input.
    Left,
    /// Right input.
    Right,
}

/// Sliding-window join between two streams.
///
/// Each side keeps its own synopsis. Whenever either side slides and both
/// sides have completed at least one window, the current windows are
/// joined with a nested loop.
#[derive(Debug)]
pub struct WindowJoin {
    condition: Condition,
    left: Synopsis,
    right: Synopsis,
    left_window: Window,
    right_window: Window,
    left_ready: bool,
    right_ready: bool,
    left_ended: bool,
    right_ended: bool,
}

impl WindowJoin {
    /// Creates a window join.
    #[must_use]
    pub fn new(left_window: Window, right_window: Window, condition: Condition) -> Self {
        Self {
            condition,
            left: Synopsis::new(&left_window),
            right: Synopsis::new(&right_window),
            left_window,
            right_window,
            left_ready: false,
            right_ready: false,
            left_ended: false,
            right_ended: false,
        }
    }

    /// Returns the join condition.
    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Returns the window of `side`.
    #[must_use]
    pub fn window(&self, side: Side) -> &Window {
        match side {
            Side::Left => &self.left_window,
            Side::Right => &self.right_window,
        }
    }

    /// Returns the synopsis of `side`.
    #[must_use]
    pub fn synopsis(&self, side: Side) -> &Synopsis {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Records end-of-stream on `side`. Returns `true` once both sides ended.
    pub(crate) fn end_side(&mut self, side: Side) -> bool {
        match side {
            Side::Left => self.left_ended = true,
            Side::Right => self.right_ended = true,
        }
        self.left_ended && self.right_ended
    }

    /// Feeds one tuple to `side`. Returns `true` if that side slid.
    pub(crate) fn accept(&mut self, side: Side, tuple: TupleRef) -> bool {
        let mut slid = false;
        let (synopsis, ready) = match side {
            Side::Left => (&mut self.left, &mut self.left_ready),
            Side::Right => (&mut self.right, &mut self.right_ready),
        };
        synopsis.enqueue(tuple, |_| slid = true);
        if slid {
            *ready = true;
        }
        slid
    }

    /// Joins the current windows if both sides have completed one.
    pub(crate) fn join(&self, schema: &SchemaRef) -> Result<Vec<TupleRef>, OperatorError> {
        if !(self.left_ready && self.right_ready) {
            return Ok(Vec::new());
        }
        let lwm = match (self.left.lwm(), self.right.lwm()) {
            (Some(l), Some(r)) => l.min(r),
            (Some(m), None) | (None, Some(m)) => m,
            (None, None) => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for l in self.left.iter() {
            for r in self.right.iter() {
                if !self.condition.check_pair(l, r)? {
                    continue;
                }
                let mut values = Vec::with_capacity(l.values().len() + r.values().len());
                values.extend_from_slice(l.values());
                values.extend_from_slice(r.values());
                out.push(Tuple::derived(
                    Arc::clone(schema),
                    values,
                    l.arrived_at().max(r.arrived_at()),
                    lwm,
                    merge_stamps([l, r]),
                ));
            }
        }
        Ok(out)
    }

    /// Clears both synopses and readiness.
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.left_ready = false;
        self.right_ready = false;
    }
}
