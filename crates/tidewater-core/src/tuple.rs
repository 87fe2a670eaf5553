//! Immutable tuples and their relation version stamps.
//!
//! A tuple records, for every relation it incorporated, the relation
//! version observed at read time. Stamps are fixed at construction; a
//! derived tuple gets a new allocation rather than a mutated stamp set.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::schema::SchemaRef;
use crate::value::{Value, ValueType};

/// Logical arrival time.
pub type Timestamp = i64;

/// Shared tuple handle.
pub type TupleRef = Arc<Tuple>;

/// Per-relation observed versions. Most tuples read at most two relations.
pub type VersionStamps = SmallVec<[(RelationId, u64); 2]>;

/// Identity of a relation inside one query container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub u32);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelationId({})", self.0)
    }
}

/// Errors raised when constructing a tuple against a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TupleError {
    /// Wrong number of values.
    #[error("expected {expected} values, got {actual}")]
    ArityMismatch {
        /// Attribute count of the schema.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A value does not match its attribute type.
    #[error("attribute {attribute}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Attribute name.
        attribute: String,
        /// Declared type.
        expected: ValueType,
        /// Supplied type.
        actual: ValueType,
    },
}

/// Tuple kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleKind {
    /// Regular data tuple.
    Data,
    /// End-of-stream marker. Operators forward it untouched.
    EndOfStream,
}

/// An immutable row flowing between operators.
#[derive(Debug, Clone)]
pub struct Tuple {
    kind: TupleKind,
    schema: SchemaRef,
    values: Vec<Value>,
    arrived_at: Timestamp,
    lwm: Timestamp,
    versions: VersionStamps,
}

impl Tuple {
    /// Creates a data tuple whose low-water mark is its arrival time.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError`] if `values` do not match `schema`.
    pub fn new(
        schema: SchemaRef,
        values: Vec<Value>,
        arrived_at: Timestamp,
    ) -> Result<TupleRef, TupleError> {
        schema.check(&values)?;
        Ok(Arc::new(Self {
            kind: TupleKind::Data,
            schema,
            values,
            arrived_at,
            lwm: arrived_at,
            versions: VersionStamps::new(),
        }))
    }

    /// Creates an end-of-stream marker.
    #[must_use]
    pub fn end_of_stream(schema: SchemaRef, arrived_at: Timestamp) -> TupleRef {
        Arc::new(Self {
            kind: TupleKind::EndOfStream,
            schema,
            values: Vec::new(),
            arrived_at,
            lwm: arrived_at,
            versions: VersionStamps::new(),
        })
    }

    /// Builds a tuple produced by an operator. Values are trusted to match.
    pub(crate) fn derived(
        schema: SchemaRef,
        values: Vec<Value>,
        arrived_at: Timestamp,
        lwm: Timestamp,
        versions: VersionStamps,
    ) -> TupleRef {
        debug_assert!(schema.check(&values).is_ok());
        Arc::new(Self {
            kind: TupleKind::Data,
            schema,
            values,
            arrived_at,
            lwm,
            versions,
        })
    }

    /// Returns a copy of this tuple stamped with `version` for `relation`.
    ///
    /// An existing stamp for the same relation is replaced.
    #[must_use]
    pub fn stamped(&self, relation: RelationId, version: u64) -> TupleRef {
        let mut copy = self.clone();
        set_stamp(&mut copy.versions, relation, version);
        Arc::new(copy)
    }

    /// Returns the tuple kind.
    #[must_use]
    pub fn kind(&self) -> TupleKind {
        self.kind
    }

    /// Returns `true` for end-of-stream markers.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.kind == TupleKind::EndOfStream
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns all values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value of the attribute called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Returns the arrival time.
    #[must_use]
    pub fn arrived_at(&self) -> Timestamp {
        self.arrived_at
    }

    /// Returns the low-water mark: the oldest arrival time this tuple
    /// was derived from.
    #[must_use]
    pub fn lwm(&self) -> Timestamp {
        self.lwm
    }

    /// Returns all version stamps.
    #[must_use]
    pub fn versions(&self) -> &[(RelationId, u64)] {
        &self.versions
    }

    /// Returns the observed version of `relation`, if this tuple read it.
    #[must_use]
    pub fn version_of(&self, relation: RelationId) -> Option<u64> {
        self.versions
            .iter()
            .find(|(id, _)| *id == relation)
            .map(|(_, v)| *v)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_of_stream() {
            return write!(f, "<EOS @{}>", self.arrived_at);
        }
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ") @{}", self.arrived_at)
    }
}

/// Sets or replaces the stamp for `relation`.
pub(crate) fn set_stamp(stamps: &mut VersionStamps, relation: RelationId, version: u64) {
    match stamps.iter_mut().find(|(id, _)| *id == relation) {
        Some(entry) => entry.1 = version,
        None => stamps.push((relation, version)),
    }
}

/// Merges the stamps of `tuples`, first occurrence per relation wins.
pub(crate) fn merge_stamps<'a>(tuples: impl IntoIterator<Item = &'a TupleRef>) -> VersionStamps {
    let mut merged = VersionStamps::new();
    for tuple in tuples {
        for &(id, version) in tuple.versions() {
            if !merged.iter().any(|(seen, _)| *seen == id) {
                merged.push((id, version));
            }
        }
    }
    merged
}

/// Monotonic logical clock handing out arrival timestamps.
#[derive(Debug, Default)]
pub struct LogicalClock {
    next: AtomicI64,
}

impl LogicalClock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next timestamp.
    pub fn tick(&self) -> Timestamp {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the timestamp the next `tick` will hand out.
    #[must_use]
    pub fn peek(&self) -> Timestamp {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn test_new_validates_schema() {
        let schema = Schema::of(&[("a", ValueType::Int)]);
        assert!(Tuple::new(schema.clone(), vec![Value::Int(1)], 0).is_ok());
        assert!(Tuple::new(schema, vec![Value::str("x")], 0).is_err());
    }

    #[test]
    fn test_stamps_are_per_relation() {
        let schema = Schema::of(&[("a", ValueType::Int)]);
        let t = Tuple::new(schema, vec![Value::Int(1)], 4).unwrap();
        assert_eq!(t.version_of(RelationId(0)), None);

        let s = t.stamped(RelationId(0), 2).stamped(RelationId(1), 7);
        assert_eq!(s.version_of(RelationId(0)), Some(2));
        assert_eq!(s.version_of(RelationId(1)), Some(7));
        // The source tuple is untouched.
        assert!(t.versions().is_empty());

        let restamped = s.stamped(RelationId(0), 3);
        assert_eq!(restamped.version_of(RelationId(0)), Some(3));
        assert_eq!(restamped.versions().len(), 2);
    }

    #[test]
    fn test_merge_stamps_keeps_first() {
        let schema = Schema::of(&[("a", ValueType::Int)]);
        let a = Tuple::new(schema.clone(), vec![Value::Int(1)], 0)
            .unwrap()
            .stamped(RelationId(0), 1);
        let b = Tuple::new(schema, vec![Value::Int(2)], 1)
            .unwrap()
            .stamped(RelationId(0), 9)
            .stamped(RelationId(3), 4);
        let merged = merge_stamps([&a, &b]);
        assert_eq!(merged.as_slice(), &[(RelationId(0), 1), (RelationId(3), 4)]);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = LogicalClock::new();
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.peek(), 2);
    }
}
