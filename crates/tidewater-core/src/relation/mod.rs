//! Mutable reference relations.
//!
//! A [`Relation`] is the only structure mutated concurrently with query
//! evaluation. Its rows and version counter sit behind one
//! `parking_lot::Mutex`; every read hands the caller the version that was
//! current while the lock was held, so the reader can stamp what it saw.
//!
//! Three read paths exist, one per concurrency-control flavour:
//! - [`Relation::read`] takes the lock for the duration of a closure.
//! - [`Relation::lock_arc`] returns an owned guard that a two-phase-locking
//!   transaction keeps until it ends. Inner reads go through the held guard
//!   and never re-acquire the lock.
//! - [`Relation::snapshot`] copies rows and version under the lock.

mod updater;

pub use updater::RelationUpdater;

use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::schema::SchemaRef;
use crate::tuple::{RelationId, Tuple, TupleError, TupleRef};
use crate::value::Value;

/// Shared relation handle.
pub type RelationRef = Arc<Relation>;

/// Owned lock on a relation's state, held across operator steps.
pub type RelationGuard = ArcMutexGuard<RawMutex, RelationState>;

/// Rows and version counter of a relation.
#[derive(Debug, Default)]
pub struct RelationState {
    tuples: Vec<TupleRef>,
    version: u64,
}

impl RelationState {
    /// Returns the rows.
    #[must_use]
    pub fn tuples(&self) -> &[TupleRef] {
        &self.tuples
    }

    /// Returns the rows for in-place mutation.
    ///
    /// Callers go through [`Relation::update`], which bumps the version.
    pub fn tuples_mut(&mut self) -> &mut Vec<TupleRef> {
        &mut self.tuples
    }

    /// Returns the current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Point-in-time copy of a relation.
#[derive(Debug, Clone)]
pub struct RelationSnapshot {
    tuples: Vec<TupleRef>,
    version: u64,
}

impl RelationSnapshot {
    /// Returns the copied rows.
    #[must_use]
    pub fn tuples(&self) -> &[TupleRef] {
        &self.tuples
    }

    /// Returns the version the copy was taken at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// A named, versioned, lock-protected table.
#[derive(Debug)]
pub struct Relation {
    id: RelationId,
    name: String,
    schema: SchemaRef,
    state: Arc<Mutex<RelationState>>,
}

impl Relation {
    /// Creates an empty relation at version 0.
    #[must_use]
    pub fn new(id: RelationId, name: &str, schema: SchemaRef) -> Self {
        Self {
            id,
            name: name.to_string(),
            schema,
            state: Arc::new(Mutex::new(RelationState::default())),
        }
    }

    /// Returns the relation identity used in version stamps.
    #[must_use]
    pub fn id(&self) -> RelationId {
        self.id
    }

    /// Returns the relation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the row schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Appends a row without changing the version. Used for loading.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError`] if `values` do not match the schema.
    pub fn insert(&self, values: Vec<Value>) -> Result<(), TupleError> {
        let tuple = Tuple::new(Arc::clone(&self.schema), values, 0)?;
        self.state.lock().tuples.push(tuple);
        Ok(())
    }

    /// Returns the current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().tuples.len()
    }

    /// Returns `true` if the relation has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` over the rows while holding the lock.
    pub fn read<R>(&self, f: impl FnOnce(&RelationState) -> R) -> R {
        let guard = self.state.lock();
        f(&guard)
    }

    /// Applies `f` to the rows under the lock and bumps the version.
    pub fn update<R>(&self, f: impl FnOnce(&mut RelationState) -> R) -> R {
        let mut guard = self.state.lock();
        let result = f(&mut guard);
        guard.bump_version();
        result
    }

    /// Acquires an owned guard that outlives the borrow of `self`.
    #[must_use]
    pub fn lock_arc(&self) -> RelationGuard {
        self.state.lock_arc()
    }

    /// Copies rows and version under the lock.
    #[must_use]
    pub fn snapshot(&self) -> RelationSnapshot {
        let guard = self.state.lock();
        RelationSnapshot {
            tuples: guard.tuples.clone(),
            version: guard.version,
        }
    }

    /// Returns `true` if the lock is currently held by someone.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }
}
