//! Optimistic concurrency control.
//!
//! Operators read relations without holding locks. The commit operator
//! checks every completed window for reference consistency: a window whose
//! tuples saw different versions of one relation is discarded and the redo
//! area is replayed from the backed-up streams. A consistent window commits
//! and lets the backups drop everything older than the next window.

use tracing::debug;

use super::error::CcError;
use super::scheduler::{CcScheduler, SchedulerCore};
use crate::operator::Step;

/// Detects inconsistent windows at the commit operator and redoes them.
#[derive(Debug)]
pub struct OptimisticCcScheduler {
    core: SchedulerCore,
}

impl OptimisticCcScheduler {
    /// Wraps prepared scheduler state.
    #[must_use]
    pub fn new(core: SchedulerCore) -> Self {
        Self { core }
    }

    fn redo(&mut self) {
        self.core.metrics.redo_count += 1;
        self.core.reset_operators();
        self.core.reset_streams();
        self.core.rewind_cursor();
        debug!(redo_count = self.core.metrics.redo_count, "window redone");
    }
}

impl CcScheduler for OptimisticCcScheduler {
    fn core(&self) -> &SchedulerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SchedulerCore {
        &mut self.core
    }

    fn wake_up(&mut self) -> Result<(), CcError> {
        match self.core.step()? {
            Step::LostConsistency { committed } => {
                if let Some(mark) = committed {
                    self.core.metrics.commits += 1;
                    self.core.evict_backup_tuples_older_than(mark);
                }
                self.redo();
            }
            Step::Commit { lwm } => {
                self.core.metrics.commits += 1;
                self.core.evict_backup_tuples_older_than(lwm);
            }
            _ => {}
        }
        Ok(())
    }
}
