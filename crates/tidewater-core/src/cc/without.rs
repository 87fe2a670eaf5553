//! Scheduling without concurrency control.

use super::error::CcError;
use super::scheduler::{CcScheduler, SchedulerCore};

/// Evaluates operators round-robin and never redoes or commits.
#[derive(Debug)]
pub struct WithoutCcScheduler {
    core: SchedulerCore,
}

impl WithoutCcScheduler {
    /// Wraps prepared scheduler state.
    #[must_use]
    pub fn new(core: SchedulerCore) -> Self {
        Self { core }
    }
}

impl CcScheduler for WithoutCcScheduler {
    fn core(&self) -> &SchedulerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SchedulerCore {
        &mut self.core
    }

    fn wake_up(&mut self) -> Result<(), CcError> {
        self.core.step()?;
        Ok(())
    }
}
