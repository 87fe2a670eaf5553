//! Attribute values and the arithmetic/comparison operations over them.
//!
//! Values are strictly typed: mixing an `Int` with a `Float` in an
//! operation is a [`OperationError::TypeMismatch`], never a silent
//! coercion. Callers that want numeric promotion use [`Value::to_float`].

use std::fmt;
use std::sync::Arc;

/// Errors raised by value arithmetic and comparison.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The two operands have different types.
    #[error("type mismatch in {op}: {left} vs {right}")]
    TypeMismatch {
        /// Operation name.
        op: &'static str,
        /// Left operand type.
        left: ValueType,
        /// Right operand type.
        right: ValueType,
    },

    /// The operation is not defined for this type.
    #[error("unsupported operation {op} on {ty}")]
    UnsupportedOperation {
        /// Operation name.
        op: &'static str,
        /// Operand type.
        ty: ValueType,
    },

    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    Str,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Str => write!(f, "STRING"),
        }
    }
}

/// Comparison operator used by conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparator {
    /// Applies the comparator to an already computed ordering.
    #[must_use]
    pub fn matches(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Lt => ordering == Less,
            Self::Le => ordering != Greater,
            Self::Gt => ordering == Greater,
            Self::Ge => ordering != Less,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value. Shared so tuple copies stay cheap.
    Str(Arc<str>),
}

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }

    /// Returns the type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
        }
    }

    /// Returns the value as a float, promoting integers.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::UnsupportedOperation`] for strings.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_float(&self) -> Result<Value, OperationError> {
        match self {
            Self::Int(i) => Ok(Self::Float(*i as f64)),
            Self::Float(f) => Ok(Self::Float(*f)),
            Self::Str(_) => Err(OperationError::UnsupportedOperation {
                op: "to_float",
                ty: ValueType::Str,
            }),
        }
    }

    /// Adds two values. Strings concatenate.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::TypeMismatch`] when the types differ.
    pub fn add(&self, rhs: &Value) -> Result<Value, OperationError> {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a.wrapping_add(*b))),
            (Self::Float(a), Self::Float(b)) => Ok(Self::Float(a + b)),
            (Self::Str(a), Self::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Self::Str(Arc::from(s)))
            }
            _ => Err(self.mismatch("add", rhs)),
        }
    }

    /// Subtracts `rhs` from `self`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::TypeMismatch`] when the types differ and
    /// [`OperationError::UnsupportedOperation`] for strings.
    pub fn subtract(&self, rhs: &Value) -> Result<Value, OperationError> {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a.wrapping_sub(*b))),
            (Self::Float(a), Self::Float(b)) => Ok(Self::Float(a - b)),
            _ => Err(self.numeric_error("subtract", rhs)),
        }
    }

    /// Multiplies two values.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::TypeMismatch`] when the types differ and
    /// [`OperationError::UnsupportedOperation`] for strings.
    pub fn multiply(&self, rhs: &Value) -> Result<Value, OperationError> {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a.wrapping_mul(*b))),
            (Self::Float(a), Self::Float(b)) => Ok(Self::Float(a * b)),
            _ => Err(self.numeric_error("multiply", rhs)),
        }
    }

    /// Divides `self` by `rhs`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::DivisionByZero`] for an integer zero
    /// divisor, plus the errors of [`Value::subtract`].
    pub fn divide(&self, rhs: &Value) -> Result<Value, OperationError> {
        match (self, rhs) {
            (Self::Int(_), Self::Int(0)) => Err(OperationError::DivisionByZero),
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a.wrapping_div(*b))),
            (Self::Float(a), Self::Float(b)) => Ok(Self::Float(a / b)),
            _ => Err(self.numeric_error("divide", rhs)),
        }
    }

    /// Compares two values of the same type.
    ///
    /// Floats compare with IEEE semantics, so any comparison against NaN
    /// other than `!=` is false.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::TypeMismatch`] when the types differ.
    pub fn compare(&self, rhs: &Value, cmp: Comparator) -> Result<bool, OperationError> {
        let ordering = match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => return Err(self.mismatch("compare", rhs)),
        };
        Ok(match ordering {
            Some(o) => cmp.matches(o),
            None => cmp == Comparator::Ne,
        })
    }

    fn mismatch(&self, op: &'static str, rhs: &Value) -> OperationError {
        OperationError::TypeMismatch {
            op,
            left: self.value_type(),
            right: rhs.value_type(),
        }
    }

    fn numeric_error(&self, op: &'static str, rhs: &Value) -> OperationError {
        if self.value_type() == rhs.value_type() {
            OperationError::UnsupportedOperation {
                op,
                ty: self.value_type(),
            }
        } else {
            self.mismatch(op, rhs)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}
