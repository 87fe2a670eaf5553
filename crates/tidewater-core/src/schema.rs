//! Tuple schemas.

use std::fmt;
use std::sync::Arc;

use crate::tuple::TupleError;
use crate::value::{Value, ValueType};

/// Shared schema handle.
pub type SchemaRef = Arc<Schema>;

/// A named, typed attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Attribute type.
    pub ty: ValueType,
}

impl Attribute {
    /// Creates an attribute.
    #[must_use]
    pub fn new(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Ordered list of attributes describing a tuple layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    /// Creates a schema from attributes.
    #[must_use]
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Shorthand for building a shared schema from `(name, type)` pairs.
    #[must_use]
    pub fn of(fields: &[(&str, ValueType)]) -> SchemaRef {
        Arc::new(Self::new(
            fields
                .iter()
                .map(|(name, ty)| Attribute::new(name, *ty))
                .collect(),
        ))
    }

    /// Returns the attributes in order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` if the schema has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns the position of the first attribute called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Returns the attribute at `index`.
    #[must_use]
    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    /// Concatenates two schemas, left attributes first.
    #[must_use]
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut attributes = Vec::with_capacity(self.len() + other.len());
        attributes.extend_from_slice(&self.attributes);
        attributes.extend_from_slice(&other.attributes);
        Self { attributes }
    }

    /// Keeps only the attributes at `indices`, in that order.
    #[must_use]
    pub fn project(&self, indices: &[usize]) -> Schema {
        Self {
            attributes: indices
                .iter()
                .filter_map(|&i| self.attributes.get(i).cloned())
                .collect(),
        }
    }

    /// Verifies that `values` match this schema.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError`] on an arity or type mismatch.
    pub fn check(&self, values: &[Value]) -> Result<(), TupleError> {
        if values.len() != self.len() {
            return Err(TupleError::ArityMismatch {
                expected: self.len(),
                actual: values.len(),
            });
        }
        for (attr, value) in self.attributes.iter().zip(values) {
            if attr.ty != value.value_type() {
                return Err(TupleError::TypeMismatch {
                    attribute: attr.name.clone(),
                    expected: attr.ty,
                    actual: value.value_type(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", attr.name, attr.ty)?;
        }
        write!(f, ")")
    }
}
