//! Relation access for resource-reference operators.
//!
//! Reads go through a [`RelationAccess`] owned by the scheduler and passed
//! into every operator step. It keeps per-transaction state keyed by
//! relation:
//!
//! - two-phase locking keeps an owned guard from the first read until
//!   transaction end, so later reads reuse the guard instead of locking
//!   again (several operators may read the same relation);
//! - snapshot isolation reads a private copy that is refreshed at
//!   transaction end;
//! - every other mode locks for the duration of a single read.

use std::fmt;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::cc::CcMode;
use crate::relation::{Relation, RelationGuard, RelationRef, RelationSnapshot};
use crate::tuple::{RelationId, TupleRef};

/// Capability of an operator that reads mutable relations.
#[derive(Debug, Clone)]
pub struct ResourceRefState {
    relations: SmallVec<[RelationRef; 1]>,
}

impl ResourceRefState {
    /// Creates the capability over `relations`.
    #[must_use]
    pub fn new(relations: impl IntoIterator<Item = RelationRef>) -> Self {
        Self {
            relations: relations.into_iter().collect(),
        }
    }

    /// Returns the referenced relations.
    #[must_use]
    pub fn relations(&self) -> &[RelationRef] {
        &self.relations
    }

    /// Ends the current transaction on every referenced relation.
    pub fn transaction_end(&self, access: &mut RelationAccess, mode: CcMode) {
        for relation in &self.relations {
            access.end_transaction(relation, mode);
        }
    }
}

/// Transaction-scoped read state shared by all operators of one plan.
pub struct RelationAccess {
    mode: CcMode,
    held: FxHashMap<RelationId, RelationGuard>,
    snapshots: FxHashMap<RelationId, RelationSnapshot>,
}

impl fmt::Debug for RelationAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut held: Vec<_> = self.held.keys().copied().collect();
        held.sort_unstable();
        let mut snapshots: Vec<_> = self
            .snapshots
            .iter()
            .map(|(id, snapshot)| (*id, snapshot.version()))
            .collect();
        snapshots.sort_unstable();
        f.debug_struct("RelationAccess")
            .field("mode", &self.mode)
            .field("held", &held)
            .field("snapshots", &snapshots)
            .finish_non_exhaustive()
    }
}

impl RelationAccess {
    /// Creates access state for `mode`.
    #[must_use]
    pub fn new(mode: CcMode) -> Self {
        Self {
            mode,
            held: FxHashMap::default(),
            snapshots: FxHashMap::default(),
        }
    }

    /// Returns the concurrency-control mode.
    #[must_use]
    pub fn mode(&self) -> CcMode {
        self.mode
    }

    /// Runs `f` over the relation rows and the version they belong to.
    pub fn read<R>(&mut self, relation: &Relation, f: impl FnOnce(&[TupleRef], u64) -> R) -> R {
        match self.mode {
            CcMode::TwoPhaseLocking => {
                let guard = self
                    .held
                    .entry(relation.id())
                    .or_insert_with(|| relation.lock_arc());
                f(guard.tuples(), guard.version())
            }
            CcMode::Snapshot => {
                let snapshot = self
                    .snapshots
                    .entry(relation.id())
                    .or_insert_with(|| relation.snapshot());
                f(snapshot.tuples(), snapshot.version())
            }
            CcMode::None | CcMode::Optimistic => {
                relation.read(|state| f(state.tuples(), state.version()))
            }
        }
    }

    /// Ends the transaction on `relation` under `mode`.
    ///
    /// Two-phase locking releases the held lock. Snapshot isolation takes a
    /// fresh copy for the next transaction.
    pub fn end_transaction(&mut self, relation: &Relation, mode: CcMode) {
        match mode {
            CcMode::TwoPhaseLocking => {
                self.held.remove(&relation.id());
            }
            CcMode::Snapshot => {
                self.snapshots.insert(relation.id(), relation.snapshot());
            }
            CcMode::None | CcMode::Optimistic => {}
        }
    }

    /// Releases every held lock.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    /// Returns the number of relation locks currently held.
    #[must_use]
    pub fn held_locks(&self) -> usize {
        self.held.len()
    }

    /// Returns the version of the snapshot held for `relation`.
    #[must_use]
    pub fn snapshot_version(&self, relation: RelationId) -> Option<u64> {
        self.snapshots.get(&relation).map(RelationSnapshot::version)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::Schema;
    use crate::value::{Value, ValueType};

    /// Helper to create a one-row relation.
    fn relation() -> RelationRef {
        let rel = Relation::new(RelationId(0), "r", Schema::of(&[("a", ValueType::Int)]));
        rel.insert(vec![Value::Int(1)]).unwrap();
        Arc::new(rel)
    }

    #[test]
    fn test_scoped_read_releases_lock() {
        let rel = relation();
        let mut access = RelationAccess::new(CcMode::Optimistic);
        let (rows, version) = access.read(&rel, |rows, v| (rows.len(), v));
        assert_eq!((rows, version), (1, 0));
        assert!(!rel.is_locked());
    }

    #[test]
    fn test_two_phase_locking_holds_until_end() {
        let rel = relation();
        let refs = ResourceRefState::new([Arc::clone(&rel)]);
        let mut access = RelationAccess::new(CcMode::TwoPhaseLocking);
        access.read(&rel, |_, _| ());
        // A second read reuses the held guard.
        access.read(&rel, |_, _| ());
        assert!(rel.is_locked());
        assert_eq!(access.held_locks(), 1);
        refs.transaction_end(&mut access, CcMode::TwoPhaseLocking);
        assert!(!rel.is_locked());
        assert_eq!(access.held_locks(), 0);
    }

    #[test]
    fn test_snapshot_reads_private_copy() {
        let rel = relation();
        let refs = ResourceRefState::new([Arc::clone(&rel)]);
        let mut access = RelationAccess::new(CcMode::Snapshot);
        assert_eq!(access.read(&rel, |_, v| v), 0);
        rel.update(|state| state.tuples_mut().clear());
        assert_eq!(access.read(&rel, |rows, v| (rows.len(), v)), (1, 0));
        assert!(!rel.is_locked());

        refs.transaction_end(&mut access, CcMode::Snapshot);
        assert_eq!(access.snapshot_version(rel.id()), Some(1));
        assert_eq!(access.read(&rel, |rows, v| (rows.len(), v)), (0, 1));
    }

    #[test]
    fn test_debug_lists_held_relations() {
        let rel = relation();
        let mut access = RelationAccess::new(CcMode::TwoPhaseLocking);
        access.read(&rel, |_, _| ());
        let shown = format!("{access:?}");
        assert!(shown.contains("TwoPhaseLocking"), "{shown}");
        assert!(shown.contains("RelationId(0)"), "{shown}");
        access.release_all();
        assert!(!rel.is_locked());
    }
}
