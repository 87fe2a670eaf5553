//! Scheduler state shared by every concurrency-control protocol.

use tracing::{debug, info, warn};

use super::commit_finder::CommitOperatorFinder;
use super::config::{CcMode, SchedulerConfig, SchedulingPolicy};
use super::error::CcError;
use super::optimistic::OptimisticCcScheduler;
use super::pessimistic::{PessimisticCcScheduler, SnapshotIsolation, TwoPhaseLocking};
use super::redo_area::RedoArea;
use super::without::WithoutCcScheduler;
use crate::operator::{OperatorId, RelationAccess, Step};
use crate::plan::QueryPlan;
use crate::tuple::Timestamp;

/// Counters maintained by a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Operator evaluations.
    pub steps: u64,
    /// Evaluations that found no input.
    pub idle_steps: u64,
    /// Commits raised by the commit operator.
    pub commits: u64,
    /// After-commit actions run by a pessimistic protocol.
    pub after_commits: u64,
    /// Windows redone by the optimistic protocol.
    pub redo_count: u64,
}

/// Serialized operators, round-robin cursor and redo bookkeeping of a plan.
#[derive(Debug)]
pub struct SchedulerCore {
    plan: QueryPlan,
    mode: CcMode,
    policy: SchedulingPolicy,
    order: Vec<OperatorId>,
    cursor: usize,
    commit_operator: Option<OperatorId>,
    overlaps: bool,
    redo_area: RedoArea,
    batch_count: usize,
    access: RelationAccess,
    pub(crate) metrics: SchedulerMetrics,
}

impl SchedulerCore {
    /// Prepares `plan` for scheduling under `config`.
    ///
    /// Finds the commit operator and the redo area, marks the redo streams
    /// for backup and tells every operator which protocol it runs under.
    ///
    /// # Errors
    ///
    /// Returns [`CcError::EmptyPlan`] for a plan without operators and
    /// [`CcError::UnsupportedCommitOperator`] if the commit operator is not
    /// a mean aggregation.
    pub fn new(mut plan: QueryPlan, config: &SchedulerConfig) -> Result<Self, CcError> {
        let order = plan.operators();
        if order.is_empty() {
            return Err(CcError::EmptyPlan);
        }
        let mode = config.mode;

        let finder = CommitOperatorFinder::new(plan.tree(), plan.root());
        let commit_operator = finder.validated()?;
        let overlaps = finder.commit_operator_overlaps();
        let redo_area = match commit_operator {
            Some(_) if mode != CcMode::None => RedoArea::find(plan.tree(), plan.root()),
            _ => RedoArea::default(),
        };
        // Two-phase locking only replays the redo area when the commit
        // window covers relation reads; otherwise backups would only grow.
        if mode != CcMode::TwoPhaseLocking || overlaps {
            redo_area.protect();
        }

        for op in plan.tree_mut().iter_mut() {
            op.set_cc_mode(mode);
            op.set_commit_operator(Some(op.id()) == commit_operator);
        }

        info!(
            mode = %mode,
            commit_operator = commit_operator.map_or("none", |id| plan.tree()[id].name()),
            overlaps,
            redo_operators = redo_area.operators().len(),
            redo_streams = redo_area.streams().len(),
            "scheduler ready"
        );
        debug!(plan = %plan.dump(), "operator tree");

        Ok(Self {
            plan,
            mode,
            policy: config.policy,
            order,
            cursor: 0,
            commit_operator,
            overlaps,
            redo_area,
            batch_count: config.batch_count.max(1),
            access: RelationAccess::new(mode),
            metrics: SchedulerMetrics::default(),
        })
    }

    /// Returns the scheduled plan.
    #[must_use]
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Returns the protocol the plan runs under.
    #[must_use]
    pub fn mode(&self) -> CcMode {
        self.mode
    }

    /// Returns the operator selection policy.
    #[must_use]
    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Returns the operators in scheduling order, upstream first.
    #[must_use]
    pub fn order(&self) -> &[OperatorId] {
        &self.order
    }

    /// Returns the commit operator, if the plan reads any relation.
    #[must_use]
    pub fn commit_operator(&self) -> Option<OperatorId> {
        self.commit_operator
    }

    /// Returns `true` if the commit operator's window covers relation reads.
    #[must_use]
    pub fn commit_operator_overlaps(&self) -> bool {
        self.overlaps
    }

    /// Returns the redo area.
    #[must_use]
    pub fn redo_area(&self) -> &RedoArea {
        &self.redo_area
    }

    /// Returns the relation access state.
    #[must_use]
    pub fn access(&self) -> &RelationAccess {
        &self.access
    }

    /// Returns the counters.
    #[must_use]
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics
    }

    /// Evaluations of the picked operator per `wake_up`.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Sets the evaluations per `wake_up`, at least one.
    pub fn set_batch_count(&mut self, count: usize) {
        self.batch_count = count.max(1);
    }

    /// Ratio of consistent to evaluated windows of the commit operator.
    #[must_use]
    pub fn consistent_rate(&self) -> Option<f64> {
        self.commit_operator
            .and_then(|id| self.plan.tree()[id].aggregation())
            .and_then(|agg| agg.consistent_rate())
    }

    /// Picks the next operator under the configured policy.
    fn next_operator(&mut self) -> OperatorId {
        match self.policy {
            SchedulingPolicy::RoundRobin => {
                let id = self.order[self.cursor];
                self.cursor = (self.cursor + 1) % self.order.len();
                id
            }
        }
    }

    /// Picks the next operator and evaluates it up to `batch_count` times.
    ///
    /// Stops early when the operator runs out of input or raises a
    /// concurrency-control signal. Signals from anything but the commit
    /// operator are logged and dropped.
    pub(crate) fn step(&mut self) -> Result<Step, CcError> {
        let id = self.next_operator();
        let op = &mut self.plan.tree_mut()[id];
        let mut last = Step::Idle;
        for _ in 0..self.batch_count {
            last = op
                .process_next(&mut self.access)
                .map_err(|source| CcError::Evaluation {
                    operator: op.name().to_string(),
                    source,
                })?;
            self.metrics.steps += 1;
            if last == Step::Idle {
                self.metrics.idle_steps += 1;
                break;
            }
            if last.is_signal() {
                if Some(id) != self.commit_operator {
                    warn!(operator = %op.name(), step = ?last, "signal from non-commit operator");
                    return Ok(Step::NoOutput);
                }
                break;
            }
        }
        Ok(last)
    }

    /// Moves the round-robin cursor back to the first operator.
    pub(crate) fn rewind_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Resets every redo-area operator and drops the pending output of all
    /// of them except the commit operator.
    pub(crate) fn reset_operators(&mut self) {
        let commit = self.commit_operator;
        let SchedulerCore {
            plan, redo_area, ..
        } = self;
        let tree = plan.tree_mut();
        for &id in redo_area.operators() {
            let op = &mut tree[id];
            op.reset();
            if Some(id) != commit {
                op.output().clear();
            }
        }
    }

    /// Replays every backed-up stream from its backup.
    pub(crate) fn reset_streams(&self) {
        for stream in self.redo_area.streams() {
            stream.recover_from_backup();
        }
    }

    /// Drops backup tuples that no future redo can need.
    pub(crate) fn evict_backup_tuples_older_than(&self, mark: Timestamp) {
        for stream in self.redo_area.streams() {
            stream.evict_backup_older_than(mark);
        }
    }

    /// Evicts backups below `mark` and replays what remains.
    pub(crate) fn evict_and_rewind(&self, mark: Timestamp) {
        for stream in self.redo_area.streams() {
            stream.evict_and_rewind(mark);
        }
    }

    /// Ends the current transaction on every resource-reference operator.
    pub(crate) fn end_transactions(&mut self) {
        let SchedulerCore {
            plan,
            order,
            access,
            mode,
            ..
        } = self;
        for &id in order.iter() {
            if let Some(reference) = plan.tree()[id].reference() {
                reference.transaction_end(access, *mode);
            }
        }
    }

    pub(crate) fn release_all(&mut self) {
        self.access.release_all();
    }
}

/// A concurrency-control protocol driving one plan.
///
/// `wake_up` advances exactly one scheduling decision: it picks the next
/// operator round-robin, evaluates it and reacts to the signal it raised.
pub trait CcScheduler: Send {
    /// Shared scheduler state.
    fn core(&self) -> &SchedulerCore;

    /// Mutable shared scheduler state.
    fn core_mut(&mut self) -> &mut SchedulerCore;

    /// Advances one scheduling step.
    ///
    /// # Errors
    ///
    /// Returns [`CcError::Evaluation`] if an operator fails.
    fn wake_up(&mut self) -> Result<(), CcError>;

    /// Returns the protocol.
    fn mode(&self) -> CcMode {
        self.core().mode()
    }

    /// Evaluations of the picked operator per `wake_up`.
    fn batch_count(&self) -> usize {
        self.core().batch_count()
    }

    /// Sets the evaluations per `wake_up`.
    fn set_batch_count(&mut self, count: usize) {
        self.core_mut().set_batch_count(count);
    }

    /// Ratio of consistent to evaluated commit-operator windows.
    fn consistent_rate(&self) -> Option<f64> {
        self.core().consistent_rate()
    }

    /// Number of redone windows. Only the optimistic protocol redoes.
    fn redo_counts(&self) -> u64 {
        self.core().metrics().redo_count
    }

    /// Returns the counters.
    fn metrics(&self) -> SchedulerMetrics {
        self.core().metrics()
    }
}

/// Builds the scheduler for `config.mode` over `plan`.
///
/// # Errors
///
/// Returns [`CcError`] if the plan is empty or its commit operator is
/// unsupported.
pub fn build_scheduler(
    plan: QueryPlan,
    config: &SchedulerConfig,
) -> Result<Box<dyn CcScheduler>, CcError> {
    let core = SchedulerCore::new(plan, config)?;
    Ok(match config.mode {
        CcMode::None => Box::new(WithoutCcScheduler::new(core)),
        CcMode::Optimistic => Box::new(OptimisticCcScheduler::new(core)),
        CcMode::TwoPhaseLocking => Box::new(PessimisticCcScheduler::<TwoPhaseLocking>::new(
            core,
            config.txn_joint_count,
        )),
        CcMode::Snapshot => Box::new(PessimisticCcScheduler::<SnapshotIsolation>::new(
            core,
            config.txn_joint_count,
        )),
    })
}
