//! Predicates for selections and joins.

use std::fmt;

use super::OperatorError;
use crate::schema::Schema;
use crate::tuple::Tuple;
use crate::value::{Comparator, Value};

/// A boolean predicate over one tuple or a pair of tuples.
///
/// In pair mode the left tuple is the stream side and the right tuple the
/// relation (or right window) side. An attribute comparator looks its left
/// name up in the left tuple and its right name in the right tuple; a
/// constant comparator checks the left tuple first and falls back to the
/// right one.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Always true.
    True,
    /// `attribute <cmp> constant`.
    Constant {
        /// Attribute name.
        attribute: String,
        /// Comparator.
        cmp: Comparator,
        /// Constant operand.
        value: Value,
    },
    /// `left <cmp> right` between two attributes.
    Attributes {
        /// Left attribute name.
        left: String,
        /// Comparator.
        cmp: Comparator,
        /// Right attribute name.
        right: String,
    },
    /// Both sub-conditions hold.
    And(Box<Condition>, Box<Condition>),
    /// Either sub-condition holds.
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Creates `attribute <cmp> value`.
    #[must_use]
    pub fn constant(attribute: &str, cmp: Comparator, value: Value) -> Self {
        Self::Constant {
            attribute: attribute.to_string(),
            cmp,
            value,
        }
    }

    /// Creates `left <cmp> right`.
    #[must_use]
    pub fn attributes(left: &str, cmp: Comparator, right: &str) -> Self {
        Self::Attributes {
            left: left.to_string(),
            cmp,
            right: right.to_string(),
        }
    }

    /// Conjunction with `other`.
    #[must_use]
    pub fn and(self, other: Condition) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with `other`.
    #[must_use]
    pub fn or(self, other: Condition) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Evaluates against a single tuple.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::UnknownAttribute`] for a missing attribute
    /// and [`OperatorError::Operation`] for incomparable values.
    pub fn check(&self, tuple: &Tuple) -> Result<bool, OperatorError> {
        match self {
            Self::True => Ok(true),
            Self::Constant {
                attribute,
                cmp,
                value,
            } => Ok(lookup(tuple, attribute)?.compare(value, *cmp)?),
            Self::Attributes { left, cmp, right } => {
                Ok(lookup(tuple, left)?.compare(lookup(tuple, right)?, *cmp)?)
            }
            Self::And(a, b) => Ok(a.check(tuple)? && b.check(tuple)?),
            Self::Or(a, b) => Ok(a.check(tuple)? || b.check(tuple)?),
        }
    }

    /// Evaluates against a pair of tuples.
    ///
    /// # Errors
    ///
    /// Same as [`Condition::check`].
    pub fn check_pair(&self, left: &Tuple, right: &Tuple) -> Result<bool, OperatorError> {
        match self {
            Self::True => Ok(true),
            Self::Constant {
                attribute,
                cmp,
                value,
            } => {
                let found = left
                    .get(attribute)
                    .or_else(|| right.get(attribute))
                    .ok_or_else(|| OperatorError::UnknownAttribute(attribute.clone()))?;
                Ok(found.compare(value, *cmp)?)
            }
            Self::Attributes {
                left: l,
                cmp,
                right: r,
            } => Ok(lookup(left, l)?.compare(lookup(right, r)?, *cmp)?),
            Self::And(a, b) => Ok(a.check_pair(left, right)? && b.check_pair(left, right)?),
            Self::Or(a, b) => Ok(a.check_pair(left, right)? || b.check_pair(left, right)?),
        }
    }

    /// Returns the first attribute name that cannot be resolved.
    ///
    /// With `right` set, names are resolved the way
    /// [`Condition::check_pair`] resolves them.
    #[must_use]
    pub fn unresolved_attribute(&self, left: &Schema, right: Option<&Schema>) -> Option<String> {
        let missing = |name: &String, schema: &Schema| {
            schema.index_of(name).is_none().then(|| name.clone())
        };
        match (self, right) {
            (Self::True, _) => None,
            (Self::Constant { attribute, .. }, None) => missing(attribute, left),
            (Self::Constant { attribute, .. }, Some(r)) => {
                missing(attribute, left).and_then(|_| missing(attribute, r))
            }
            (Self::Attributes { left: l, right: rn, .. }, None) => {
                missing(l, left).or_else(|| missing(rn, left))
            }
            (Self::Attributes { left: l, right: rn, .. }, Some(r)) => {
                missing(l, left).or_else(|| missing(rn, r))
            }
            (Self::And(a, b) | Self::Or(a, b), _) => a
                .unresolved_attribute(left, right)
                .or_else(|| b.unresolved_attribute(left, right)),
        }
    }
}

fn lookup<'a>(tuple: &'a Tuple, name: &str) -> Result<&'a Value, OperatorError> {
    tuple
        .get(name)
        .ok_or_else(|| OperatorError::UnknownAttribute(name.to_string()))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::Constant {
                attribute,
                cmp,
                value,
            } => write!(f, "{attribute} {cmp} {value}"),
            Self::Attributes { left, cmp, right } => write!(f, "{left} {cmp} {right}"),
            Self::And(a, b) => write!(f, "({a} && {b})"),
            Self::Or(a, b) => write!(f, "({a} || {b})"),
        }
    }
}
