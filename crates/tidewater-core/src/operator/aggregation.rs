//! Windowed aggregation capability.

use crate::schema::SchemaRef;
use crate::stream::Stream;
use crate::tuple::{merge_stamps, Timestamp, Tuple, TupleRef};
use crate::value::Value;
use crate::window::{Synopsis, Window, WindowContents};

use super::{OperatorError, Step};

/// Function computed over each completed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Arithmetic mean of one numeric attribute, emitted as a float.
    Mean {
        /// Position of the averaged attribute in the input schema.
        attribute: usize,
    },
    /// Emits the newest tuple of every window.
    Election,
}

/// How an aggregation reacts to completed windows, derived from the
/// concurrency-control mode and whether it is the commit operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CommitRole {
    /// Discard inconsistent windows and report lost consistency.
    pub check_consistency: bool,
    /// Report a commit after every emitted window.
    pub signal_commit: bool,
    /// Keep the commit pending until the scheduler closes it.
    pub defer_close: bool,
}

/// Window, synopsis and counters of an aggregation operator.
#[derive(Debug)]
pub struct AggregationState {
    window: Window,
    synopsis: Synopsis,
    function: AggregateFunction,
    pending_commit: bool,
    evaluated: u64,
    consistent: u64,
    emitted: u64,
}

impl AggregationState {
    /// Creates the capability with an empty synopsis.
    #[must_use]
    pub fn new(window: Window, function: AggregateFunction) -> Self {
        Self {
            synopsis: Synopsis::new(&window),
            window,
            function,
            pending_commit: false,
            evaluated: 0,
            consistent: 0,
            emitted: 0,
        }
    }

    /// Returns the window specification.
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Returns the synopsis.
    #[must_use]
    pub fn synopsis(&self) -> &Synopsis {
        &self.synopsis
    }

    /// Returns the aggregate function.
    #[must_use]
    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    /// Returns `true` for a mean aggregation.
    #[must_use]
    pub fn is_mean(&self) -> bool {
        matches!(self.function, AggregateFunction::Mean { .. })
    }

    /// Oldest timestamp the next window still needs.
    #[must_use]
    pub fn window_beginning_lwm(&self) -> Timestamp {
        self.synopsis.window_beginning_lwm()
    }

    /// Newest arrival time in the current window.
    #[must_use]
    pub fn window_hwm(&self) -> Option<Timestamp> {
        self.synopsis.hwm()
    }

    /// Returns `true` while a commit waits to be closed by the scheduler.
    #[must_use]
    pub fn pending_commit(&self) -> bool {
        self.pending_commit
    }

    /// Number of windows evaluated.
    #[must_use]
    pub fn evaluated(&self) -> u64 {
        self.evaluated
    }

    /// Number of evaluated windows that were reference-consistent.
    #[must_use]
    pub fn consistent(&self) -> u64 {
        self.consistent
    }

    /// Number of results emitted downstream.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Ratio of consistent to evaluated windows, once one was evaluated.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn consistent_rate(&self) -> Option<f64> {
        (self.evaluated > 0).then(|| self.consistent as f64 / self.evaluated as f64)
    }

    /// Clears the synopsis and the pending-commit flag. Counters survive.
    pub fn reset(&mut self) {
        self.synopsis.reset();
        self.pending_commit = false;
    }

    /// Takes the pending commit if one is open.
    pub(crate) fn close_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending_commit)
    }

    /// Feeds one data tuple and emits results for every completed window.
    pub(crate) fn accept(
        &mut self,
        tuple: TupleRef,
        schema: &SchemaRef,
        output: &Stream,
        role: CommitRole,
    ) -> Result<Step, OperatorError> {
        let Self {
            synopsis,
            function,
            evaluated,
            consistent,
            emitted: total_emitted,
            ..
        } = self;

        let mut emitted = 0usize;
        let mut lost = false;
        let mut committed: Option<Timestamp> = None;
        let mut error: Option<OperatorError> = None;

        synopsis.enqueue(tuple, |window| {
            if lost || error.is_some() {
                return;
            }
            *evaluated += 1;
            let is_consistent = window.has_reference_consistency();
            if is_consistent {
                *consistent += 1;
            }
            if role.check_consistency && !is_consistent {
                lost = true;
                return;
            }
            match aggregate(*function, &window, schema) {
                Ok(result) => {
                    output.enqueue(result);
                    emitted += 1;
                    *total_emitted += 1;
                    committed = Some(window.window_beginning_lwm());
                }
                Err(e) => error = Some(e),
            }
        });

        if let Some(e) = error {
            return Err(e);
        }
        if lost {
            return Ok(Step::LostConsistency {
                committed: committed.filter(|_| role.signal_commit),
            });
        }
        match committed {
            Some(lwm) if role.signal_commit => {
                if role.defer_close {
                    self.pending_commit = true;
                }
                Ok(Step::Commit { lwm })
            }
            _ if emitted > 0 => Ok(Step::Emitted(emitted)),
            _ => Ok(Step::NoOutput),
        }
    }
}

/// Computes the output tuple for one window.
fn aggregate(
    function: AggregateFunction,
    window: &WindowContents<'_>,
    schema: &SchemaRef,
) -> Result<TupleRef, OperatorError> {
    let lwm = window.lwm().unwrap_or_default();
    let arrived_at = window.hwm().unwrap_or(lwm);
    let versions = merge_stamps(window.iter());
    match function {
        AggregateFunction::Mean { attribute } => {
            let mut sum = Value::Float(0.0);
            for tuple in window.iter() {
                let value = tuple
                    .value(attribute)
                    .ok_or_else(|| OperatorError::UnknownAttribute(format!("#{attribute}")))?;
                sum = sum.add(&value.to_float()?)?;
            }
            let count = Value::Int(i64::try_from(window.len()).unwrap_or(i64::MAX)).to_float()?;
            let mean = sum.divide(&count)?;
            Ok(Tuple::derived(
                SchemaRef::clone(schema),
                vec![mean],
                arrived_at,
                lwm,
                versions,
            ))
        }
        AggregateFunction::Election => {
            let newest = window.newest().ok_or(OperatorError::EmptyWindow)?;
            Ok(Tuple::derived(
                SchemaRef::clone(schema),
                newest.values().to_vec(),
                arrived_at,
                lwm,
                versions,
            ))
        }
    }
}
