//! # Operator Module
//!
//! Pull-based operators forming a query tree.
//!
//! ## Shapes
//!
//! - **Source**: a stream adapter reading an external input stream
//! - **Single**: one parent (selection, projection, relation join, aggregation)
//! - **Double**: two parents (window join)
//!
//! An operator may additionally carry the aggregation capability (a window
//! and its synopsis) and/or the resource-reference capability (read access
//! to relations). Each call to [`Operator::process_next`] consumes at most
//! one tuple per input and reports what happened as a [`Step`].
//!
//! End-of-stream tuples are forwarded unchanged by every operator.

pub mod aggregation;
pub mod condition;
pub mod join;
pub mod reference;
pub mod select;
pub mod tree;

use std::fmt;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

pub use aggregation::{AggregateFunction, AggregationState};
pub use condition::Condition;
pub use join::{RelationJoin, Side, WindowJoin};
pub use reference::{RelationAccess, ResourceRefState};
pub use select::{Projection, Selection};
pub use tree::OperatorTree;

use crate::cc::CcMode;
use crate::schema::SchemaRef;
use crate::stream::StreamRef;
use crate::tuple::Timestamp;
use crate::value::OperationError;
use aggregation::CommitRole;

/// Unique identifier of an operator within one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(pub u32);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorId({})", self.0)
    }
}

/// Errors raised while evaluating an operator.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// Value arithmetic or comparison failed.
    #[error("operation failed: {0}")]
    Operation(#[from] OperationError),

    /// An attribute could not be resolved on a tuple.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    /// An aggregate was computed over an empty window.
    #[error("empty window")]
    EmptyWindow,

    /// A resource-reference operator has no relation attached.
    #[error("operator {0} references no relation")]
    MissingRelation(String),

    /// The operator body does not fit its input shape.
    #[error("operator {0} has an invalid shape")]
    InvalidShape(String),
}

/// Outcome of one evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No input was available.
    Idle,
    /// Input was consumed without producing output.
    NoOutput,
    /// This many tuples were emitted.
    Emitted(usize),
    /// The commit operator's window read inconsistent relation versions
    /// and was discarded.
    LostConsistency {
        /// Eviction mark of a window that committed earlier in the same step.
        committed: Option<Timestamp>,
    },
    /// A consistent window was emitted by the commit operator.
    Commit {
        /// Backup tuples below this mark are no longer needed.
        lwm: Timestamp,
    },
    /// New input arrived while a previous commit is still open.
    PendingAbort {
        /// Low-water mark of the waiting input tuple.
        hwm: Timestamp,
    },
}

impl Step {
    /// Returns `true` for the concurrency-control signals.
    #[must_use]
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Self::LostConsistency { .. } | Self::Commit { .. } | Self::PendingAbort { .. }
        )
    }
}

/// Input wiring of an operator.
#[derive(Debug, Clone)]
pub enum OperatorShape {
    /// Reads an external stream.
    Source {
        /// The external input stream.
        input: StreamRef,
    },
    /// Reads the output stream of one parent.
    Single {
        /// Upstream operator.
        parent: OperatorId,
        /// Parent's output stream.
        input: StreamRef,
    },
    /// Reads the output streams of two parents.
    Double {
        /// Left upstream operator.
        left: OperatorId,
        /// Right upstream operator.
        right: OperatorId,
        /// Left parent's output stream.
        left_input: StreamRef,
        /// Right parent's output stream.
        right_input: StreamRef,
    },
}

/// Per-operator logic.
#[derive(Debug)]
pub enum OperatorBody {
    /// Forwards an external stream into the tree.
    StreamAdapter,
    /// Filters by a condition.
    Selection(Selection),
    /// Keeps a subset of attributes.
    Projection(Projection),
    /// Joins a stream with a relation. Carries the resource-reference capability.
    RelationJoin(RelationJoin),
    /// Joins two windowed streams.
    WindowJoin(WindowJoin),
    /// Windowed aggregate. Carries the aggregation capability.
    Aggregate,
}

/// Evaluation counters of one operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorMetrics {
    /// Tuples taken from the inputs.
    pub consumed: u64,
    /// Tuples written to the output stream.
    pub emitted: u64,
}

/// A node of the query tree.
#[derive(Debug)]
pub struct Operator {
    id: OperatorId,
    name: String,
    shape: OperatorShape,
    body: OperatorBody,
    aggregation: Option<AggregationState>,
    reference: Option<ResourceRefState>,
    schema: SchemaRef,
    output: StreamRef,
    cc_mode: CcMode,
    commit: bool,
    metrics: OperatorMetrics,
}

impl Operator {
    pub(crate) fn new(
        id: OperatorId,
        name: &str,
        shape: OperatorShape,
        body: OperatorBody,
        schema: SchemaRef,
        output: StreamRef,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape,
            body,
            aggregation: None,
            reference: None,
            schema,
            output,
            cc_mode: CcMode::None,
            commit: false,
            metrics: OperatorMetrics::default(),
        }
    }

    pub(crate) fn with_aggregation(mut self, state: AggregationState) -> Self {
        self.aggregation = Some(state);
        self
    }

    pub(crate) fn with_reference(mut self, state: ResourceRefState) -> Self {
        self.reference = Some(state);
        self
    }

    /// Returns the operator id.
    #[must_use]
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// Returns the operator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the input wiring.
    #[must_use]
    pub fn shape(&self) -> &OperatorShape {
        &self.shape
    }

    /// Returns the operator logic.
    #[must_use]
    pub fn body(&self) -> &OperatorBody {
        &self.body
    }

    /// Returns the output schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the output stream.
    #[must_use]
    pub fn output(&self) -> &StreamRef {
        &self.output
    }

    /// Returns the aggregation capability, if any.
    #[must_use]
    pub fn aggregation(&self) -> Option<&AggregationState> {
        self.aggregation.as_ref()
    }

    /// Returns the resource-reference capability, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&ResourceRefState> {
        self.reference.as_ref()
    }

    /// Returns `true` if the operator aggregates over a window.
    #[must_use]
    pub fn is_aggregation(&self) -> bool {
        self.aggregation.is_some()
    }

    /// Returns `true` if the operator reads relations.
    #[must_use]
    pub fn is_resource_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Returns `true` for operators that buffer windows: aggregations and
    /// window joins.
    #[must_use]
    pub fn is_window_operator(&self) -> bool {
        self.is_aggregation() || matches!(self.body, OperatorBody::WindowJoin(_))
    }

    /// Returns the upstream operators, left first.
    #[must_use]
    pub fn parents(&self) -> SmallVec<[OperatorId; 2]> {
        match &self.shape {
            OperatorShape::Source { .. } => SmallVec::new(),
            OperatorShape::Single { parent, .. } => smallvec![*parent],
            OperatorShape::Double { left, right, .. } => smallvec![*left, *right],
        }
    }

    /// Returns the concurrency-control mode the operator runs under.
    #[must_use]
    pub fn cc_mode(&self) -> CcMode {
        self.cc_mode
    }

    /// Returns `true` if this is the plan's commit operator.
    #[must_use]
    pub fn is_commit_operator(&self) -> bool {
        self.commit
    }

    /// Returns the evaluation counters.
    #[must_use]
    pub fn metrics(&self) -> OperatorMetrics {
        self.metrics
    }

    /// Short name of the operator kind, used in plan dumps.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.body {
            OperatorBody::StreamAdapter => "stream",
            OperatorBody::Selection(_) => "select",
            OperatorBody::Projection(_) => "project",
            OperatorBody::RelationJoin(_) => "combine",
            OperatorBody::WindowJoin(_) => "join",
            OperatorBody::Aggregate => match self.aggregation.as_ref().map(AggregationState::function) {
                Some(AggregateFunction::Mean { .. }) => "mean",
                Some(AggregateFunction::Election) => "elect",
                None => "aggregate",
            },
        }
    }

    pub(crate) fn set_cc_mode(&mut self, mode: CcMode) {
        self.cc_mode = mode;
    }

    pub(crate) fn set_commit_operator(&mut self, commit: bool) {
        self.commit = commit;
    }

    pub(crate) fn aggregation_mut(&mut self) -> Option<&mut AggregationState> {
        self.aggregation.as_mut()
    }

    /// Clears windowed state so the operator can be replayed.
    pub fn reset(&mut self) {
        if let Some(agg) = self.aggregation.as_mut() {
            agg.reset();
        }
        if let OperatorBody::WindowJoin(join) = &mut self.body {
            join.reset();
        }
    }

    fn commit_role(&self) -> CommitRole {
        CommitRole {
            check_consistency: self.commit && self.cc_mode == CcMode::Optimistic,
            signal_commit: self.commit && self.cc_mode != CcMode::None,
            defer_close: self.commit && self.cc_mode.is_pessimistic(),
        }
    }

    /// Runs one evaluation step.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError`] if evaluating the consumed tuple fails.
    pub fn process_next(&mut self, access: &mut RelationAccess) -> Result<Step, OperatorError> {
        match &self.shape {
            OperatorShape::Source { input } => {
                let Some(tuple) = input.try_dequeue() else {
                    return Ok(Step::Idle);
                };
                self.metrics.consumed += 1;
                self.metrics.emitted += 1;
                self.output.enqueue(tuple);
                Ok(Step::Emitted(1))
            }
            OperatorShape::Single { input, .. } => {
                let input = Arc::clone(input);
                self.process_single(&input, access)
            }
            OperatorShape::Double {
                left_input,
                right_input,
                ..
            } => {
                let (left, right) = (Arc::clone(left_input), Arc::clone(right_input));
                self.process_double(&left, &right)
            }
        }
    }

    fn process_single(
        &mut self,
        input: &StreamRef,
        access: &mut RelationAccess,
    ) -> Result<Step, OperatorError> {
        if let Some(agg) = self.aggregation.as_mut() {
            if agg.pending_commit() {
                // The previous commit must be closed before new input is accepted.
                return Ok(match input.peek() {
                    Some(head) => {
                        agg.close_pending();
                        Step::PendingAbort { hwm: head.lwm() }
                    }
                    None => Step::Idle,
                });
            }
        }

        let Some(tuple) = input.try_dequeue() else {
            return Ok(Step::Idle);
        };
        self.metrics.consumed += 1;
        if tuple.is_end_of_stream() {
            self.output.enqueue(tuple);
            self.metrics.emitted += 1;
            return Ok(Step::Emitted(1));
        }

        let role = self.commit_role();
        let outputs = match &mut self.body {
            OperatorBody::Selection(selection) => {
                if selection.filter(&tuple)? {
                    vec![tuple]
                } else {
                    Vec::new()
                }
            }
            OperatorBody::Projection(projection) => vec![projection.project(&tuple, &self.schema)?],
            OperatorBody::RelationJoin(join) => {
                let relation = self
                    .reference
                    .as_ref()
                    .and_then(|r| r.relations().first())
                    .ok_or_else(|| OperatorError::MissingRelation(self.name.clone()))?;
                join.probe(&tuple, relation, &self.schema, access)?
            }
            OperatorBody::Aggregate => {
                let agg = self
                    .aggregation
                    .as_mut()
                    .ok_or_else(|| OperatorError::InvalidShape(self.name.clone()))?;
                let before = agg.emitted();
                let step = agg.accept(tuple, &self.schema, &self.output, role)?;
                self.metrics.emitted += agg.emitted() - before;
                return Ok(step);
            }
            OperatorBody::StreamAdapter | OperatorBody::WindowJoin(_) => {
                return Err(OperatorError::InvalidShape(self.name.clone()));
            }
        };

        if outputs.is_empty() {
            return Ok(Step::NoOutput);
        }
        let count = outputs.len();
        for out in outputs {
            self.output.enqueue(out);
        }
        self.metrics.emitted += count as u64;
        Ok(Step::Emitted(count))
    }

    fn process_double(&mut self, left: &StreamRef, right: &StreamRef) -> Result<Step, OperatorError> {
        let OperatorBody::WindowJoin(join) = &mut self.body else {
            return Err(OperatorError::InvalidShape(self.name.clone()));
        };

        let mut consumed = false;
        let mut slid = false;
        let mut emitted = 0usize;
        for (side, input) in [(Side::Left, left), (Side::Right, right)] {
            let Some(tuple) = input.try_dequeue() else {
                continue;
            };
            consumed = true;
            self.metrics.consumed += 1;
            if tuple.is_end_of_stream() {
                if join.end_side(side) {
                    self.output.enqueue(tuple);
                    emitted += 1;
                }
                continue;
            }
            slid |= join.accept(side, tuple);
        }
        if !consumed {
            return Ok(Step::Idle);
        }
        if slid {
            for out in join.join(&self.schema)? {
                self.output.enqueue(out);
                emitted += 1;
            }
        }
        self.metrics.emitted += emitted as u64;
        Ok(if emitted > 0 {
            Step::Emitted(emitted)
        } else {
            Step::NoOutput
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Relation;
    use crate::schema::Schema;
    use crate::stream::Stream;
    use crate::tuple::{RelationId, Tuple, TupleRef};
    use crate::value::{Comparator, Value, ValueType};
    use crate::window::Window;

    /// Helper to create a single-int tuple.
    fn int(v: i64, ts: i64) -> TupleRef {
        Tuple::new(Schema::of(&[("v", ValueType::Int)]), vec![Value::Int(v)], ts).unwrap()
    }

    /// Helper to create a single-input operator reading `input`.
    fn single(body: OperatorBody, input: &StreamRef, schema: SchemaRef) -> Operator {
        Operator::new(
            OperatorId(1),
            "op",
            OperatorShape::Single {
                parent: OperatorId(0),
                input: Arc::clone(input),
            },
            body,
            schema,
            Stream::shared("out"),
        )
    }

    #[test]
    fn test_source_forwards() {
        let input = Stream::shared("in");
        let mut op = Operator::new(
            OperatorId(0),
            "src",
            OperatorShape::Source {
                input: Arc::clone(&input),
            },
            OperatorBody::StreamAdapter,
            Schema::of(&[("v", ValueType::Int)]),
            Stream::shared("src"),
        );
        let mut access = RelationAccess::new(CcMode::None);
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Idle);
        input.enqueue(int(1, 0));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Emitted(1));
        assert_eq!(op.output().len(), 1);
        assert!(op.parents().is_empty());
    }

    #[test]
    fn test_selection_and_end_of_stream() {
        let input = Stream::shared("in");
        let schema = Schema::of(&[("v", ValueType::Int)]);
        let mut op = single(
            OperatorBody::Selection(Selection::new(Condition::constant(
                "v",
                Comparator::Gt,
                Value::Int(1),
            ))),
            &input,
            Arc::clone(&schema),
        );
        let mut access = RelationAccess::new(CcMode::None);
        input.enqueue(int(1, 0));
        input.enqueue(int(2, 1));
        input.enqueue(Tuple::end_of_stream(schema, 2));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::NoOutput);
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Emitted(1));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Emitted(1));
        assert!(op.output().try_dequeue().is_some());
        assert!(op.output().try_dequeue().unwrap().is_end_of_stream());
        assert_eq!(op.metrics().consumed, 3);
    }

    #[test]
    fn test_relation_join_operator() {
        let input = Stream::shared("in");
        let rel = Arc::new(Relation::new(RelationId(0), "r", Schema::of(&[("id", ValueType::Int)])));
        rel.insert(vec![Value::Int(5)]).unwrap();
        let schema = Arc::new(int(0, 0).schema().concat(rel.schema()));
        let mut op = single(
            OperatorBody::RelationJoin(RelationJoin::new(Condition::attributes(
                "v",
                Comparator::Eq,
                "id",
            ))),
            &input,
            schema,
        )
        .with_reference(ResourceRefState::new([Arc::clone(&rel)]));
        assert!(op.is_resource_reference());
        assert!(!op.is_window_operator());

        let mut access = RelationAccess::new(CcMode::None);
        input.enqueue(int(5, 0));
        input.enqueue(int(6, 1));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Emitted(1));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::NoOutput);
        let joined = op.output().try_dequeue().unwrap();
        assert_eq!(joined.version_of(RelationId(0)), Some(0));
    }

    #[test]
    fn test_pessimistic_pending_commit_aborts_next_input() {
        let input = Stream::shared("in");
        let mut op = single(
            OperatorBody::Aggregate,
            &input,
            Schema::of(&[("mean", ValueType::Float)]),
        )
        .with_aggregation(AggregationState::new(
            Window::tuples(1, 1),
            AggregateFunction::Mean { attribute: 0 },
        ));
        op.set_cc_mode(CcMode::TwoPhaseLocking);
        op.set_commit_operator(true);
        let mut access = RelationAccess::new(CcMode::TwoPhaseLocking);

        input.enqueue(int(4, 10));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Commit { lwm: 11 });
        // Nothing waiting: stays pending.
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Idle);
        input.enqueue(int(6, 12));
        assert_eq!(
            op.process_next(&mut access).unwrap(),
            Step::PendingAbort { hwm: 12 }
        );
        // The waiting tuple was not consumed.
        assert_eq!(input.len(), 1);
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Commit { lwm: 13 });
        assert_eq!(op.kind_name(), "mean");
    }

    #[test]
    fn test_window_join_operator() {
        let left = Stream::shared("l");
        let right = Stream::shared("r");
        let schema = Arc::new(int(0, 0).schema().concat(int(0, 0).schema()));
        let mut op = Operator::new(
            OperatorId(2),
            "j",
            OperatorShape::Double {
                left: OperatorId(0),
                right: OperatorId(1),
                left_input: Arc::clone(&left),
                right_input: Arc::clone(&right),
            },
            OperatorBody::WindowJoin(WindowJoin::new(
                Window::tuples(1, 1),
                Window::tuples(1, 1),
                Condition::True,
            )),
            Arc::clone(&schema),
            Stream::shared("j"),
        );
        let mut access = RelationAccess::new(CcMode::None);
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Idle);
        left.enqueue(int(1, 0));
        right.enqueue(int(2, 1));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Emitted(1));
        assert!(op.is_window_operator());
        assert_eq!(op.parents().as_slice(), &[OperatorId(0), OperatorId(1)]);

        left.enqueue(Tuple::end_of_stream(Arc::clone(&schema), 2));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::NoOutput);
        right.enqueue(Tuple::end_of_stream(schema, 3));
        assert_eq!(op.process_next(&mut access).unwrap(), Step::Emitted(1));
    }
}
