//! Background writer that keeps a relation moving.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{RelationRef, RelationState};

/// Periodically mutates a relation and bumps its version.
///
/// Each round sleeps for `interval`, then takes the relation lock, applies
/// the mutation, bumps the version and keeps the lock for `hold` before
/// releasing it. The hold models a slow writer that readers must wait for.
#[derive(Debug)]
pub struct RelationUpdater {
    relation: RelationRef,
    interval: Duration,
    hold: Duration,
    stop: Arc<AtomicBool>,
}

impl RelationUpdater {
    /// Creates an updater for `relation`.
    #[must_use]
    pub fn new(relation: RelationRef, interval: Duration, hold: Duration) -> Self {
        Self {
            relation,
            interval,
            hold,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the flag that stops the loop once set.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs one update round without the leading sleep.
    pub fn update_once(&self, mutate: &mut impl FnMut(&mut RelationState)) {
        self.relation.update(|state| {
            mutate(state);
            if !self.hold.is_zero() {
                thread::sleep(self.hold);
            }
        });
    }

    /// Loops until the stop flag is raised. Returns the number of updates.
    pub fn run(&self, mut mutate: impl FnMut(&mut RelationState)) -> u64 {
        let mut updates = 0u64;
        while !self.stop.load(Ordering::Acquire) {
            thread::sleep(self.interval);
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            self.update_once(&mut mutate);
            updates += 1;
        }
        tracing::debug!(
            "updater for {} stopped after {updates} updates",
            self.relation.name()
        );
        updates
    }

    /// Runs the loop on a new thread.
    pub fn spawn<F>(self, mutate: F) -> JoinHandle<u64>
    where
        F: FnMut(&mut RelationState) + Send + 'static,
    {
        thread::spawn(move || self.run(mutate))
    }
}
