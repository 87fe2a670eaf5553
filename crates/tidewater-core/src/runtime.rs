//! Query-processing loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cc::{CcError, CcScheduler};

/// Drives a scheduler in a tight yield loop until stopped.
///
/// Every iteration advances one scheduling step and yields the thread so
/// that a relation updater sharing the core can make progress.
pub struct QueryProcessor {
    scheduler: Box<dyn CcScheduler>,
    stop: Arc<AtomicBool>,
    wake_ups: u64,
}

impl std::fmt::Debug for QueryProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryProcessor")
            .field("mode", &self.scheduler.mode())
            .field("wake_ups", &self.wake_ups)
            .finish_non_exhaustive()
    }
}

impl QueryProcessor {
    /// Creates a processor around `scheduler`.
    #[must_use]
    pub fn new(scheduler: Box<dyn CcScheduler>) -> Self {
        Self {
            scheduler,
            stop: Arc::new(AtomicBool::new(false)),
            wake_ups: 0,
        }
    }

    /// Returns the flag that stops the loop once set.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Returns the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &dyn CcScheduler {
        self.scheduler.as_ref()
    }

    /// Consumes the processor, returning its scheduler.
    #[must_use]
    pub fn into_scheduler(self) -> Box<dyn CcScheduler> {
        self.scheduler
    }

    /// Returns the number of scheduling steps taken.
    #[must_use]
    pub fn wake_ups(&self) -> u64 {
        self.wake_ups
    }

    /// Loops until the stop flag is raised.
    ///
    /// # Errors
    ///
    /// Returns the first [`CcError`] raised by the scheduler.
    pub fn run(&mut self) -> Result<(), CcError> {
        while !self.stop.load(Ordering::Acquire) {
            self.scheduler.wake_up()?;
            self.wake_ups += 1;
            thread::yield_now();
        }
        tracing::debug!(wake_ups = self.wake_ups, "query processor stopped");
        Ok(())
    }

    /// Runs the loop on a new thread and hands the processor back when it
    /// stops, so its scheduler can be inspected.
    pub fn spawn(mut self) -> JoinHandle<Result<Self, CcError>> {
        thread::spawn(move || {
            self.run()?;
            Ok(self)
        })
    }
}
