//! Error types for query construction.

/// Errors that can occur while building a query plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A stream, relation or operator with this name already exists.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// An operator references an undeclared upstream.
    #[error("operator not found: {0}")]
    UnknownOperator(String),

    /// An operator references an undeclared relation.
    #[error("relation not found: {0}")]
    UnknownRelation(String),

    /// An attribute name does not resolve against the input schema.
    #[error("operator {operator}: unknown attribute {attribute}")]
    UnknownAttribute {
        /// Operator name.
        operator: String,
        /// Unresolved attribute.
        attribute: String,
    },

    /// A mean was requested over a non-numeric attribute.
    #[error("operator {operator}: attribute {attribute} is not numeric")]
    NonNumericAttribute {
        /// Operator name.
        operator: String,
        /// Offending attribute.
        attribute: String,
    },

    /// Two operators consume the same upstream. Plans are strict trees.
    #[error("upstream {0} already has a consumer")]
    SharedUpstream(String),

    /// The plan has no operators.
    #[error("empty plan: no operators")]
    EmptyPlan,
}
