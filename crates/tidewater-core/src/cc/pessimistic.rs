//! Pessimistic concurrency control.
//!
//! The commit operator keeps each commit open until the next tuple reaches
//! it. Every `txn_joint_count` commits form one transaction; when the open
//! commit is closed after that many, the protocol's after-commit action
//! ends the transaction on every resource-reference operator.
//!
//! - [`TwoPhaseLocking`] releases the relation locks held since the first
//!   read. If the commit window itself covers relation reads, the redo area
//!   is also rewound to the waiting tuple so the next window reads under
//!   fresh locks.
//! - [`SnapshotIsolation`] refreshes the private relation copies and always
//!   rewinds the redo area.

use std::fmt;

use tracing::debug;

use super::config::CcMode;
use super::error::CcError;
use super::scheduler::{CcScheduler, SchedulerCore};
use crate::operator::Step;
use crate::tuple::Timestamp;

/// After-commit action of a pessimistic protocol.
pub trait PessimisticPolicy: fmt::Debug + Default + Send {
    /// The protocol this policy implements.
    const MODE: CcMode;

    /// Ends the transaction; `hwm` is the low-water mark of the tuple
    /// waiting at the commit operator.
    fn after_commit(&mut self, core: &mut SchedulerCore, hwm: Timestamp);
}

/// Two-phase locking: relation locks are released together at commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct TwoPhaseLocking;

impl PessimisticPolicy for TwoPhaseLocking {
    const MODE: CcMode = CcMode::TwoPhaseLocking;

    fn after_commit(&mut self, core: &mut SchedulerCore, hwm: Timestamp) {
        core.end_transactions();
        if core.commit_operator_overlaps() {
            core.evict_and_rewind(hwm);
            core.reset_operators();
        }
    }
}

/// Snapshot isolation: each transaction reads a private relation copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotIsolation;

impl PessimisticPolicy for SnapshotIsolation {
    const MODE: CcMode = CcMode::Snapshot;

    fn after_commit(&mut self, core: &mut SchedulerCore, hwm: Timestamp) {
        core.end_transactions();
        core.evict_and_rewind(hwm);
        core.reset_operators();
    }
}

/// Joins commits into transactions and runs `P`'s after-commit action.
#[derive(Debug)]
pub struct PessimisticCcScheduler<P: PessimisticPolicy> {
    core: SchedulerCore,
    policy: P,
    txn_joint_count: usize,
    commit_count: usize,
}

impl<P: PessimisticPolicy> PessimisticCcScheduler<P> {
    /// Wraps prepared scheduler state. `txn_joint_count` is clamped to at
    /// least one.
    #[must_use]
    pub fn new(core: SchedulerCore, txn_joint_count: usize) -> Self {
        debug_assert_eq!(core.mode(), P::MODE);
        Self {
            core,
            policy: P::default(),
            txn_joint_count: txn_joint_count.max(1),
            commit_count: 0,
        }
    }

    /// Commits joined into one transaction.
    #[must_use]
    pub fn txn_joint_count(&self) -> usize {
        self.txn_joint_count
    }

    /// Commits counted toward the open transaction.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }
}

impl<P: PessimisticPolicy> CcScheduler for PessimisticCcScheduler<P> {
    fn core(&self) -> &SchedulerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SchedulerCore {
        &mut self.core
    }

    fn wake_up(&mut self) -> Result<(), CcError> {
        match self.core.step()? {
            Step::Commit { .. } => {
                self.core.metrics.commits += 1;
                self.commit_count += 1;
            }
            Step::PendingAbort { hwm } => {
                if self.commit_count >= self.txn_joint_count {
                    self.commit_count = 0;
                    self.core.metrics.after_commits += 1;
                    self.policy.after_commit(&mut self.core, hwm);
                    debug!(mode = %P::MODE, hwm, "transaction ended");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl<P: PessimisticPolicy> Drop for PessimisticCcScheduler<P> {
    fn drop(&mut self) {
        self.core.release_all();
    }
}
