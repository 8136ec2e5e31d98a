//! Error types for ShEx schemas and validation.
//!
//! Validation outcomes (cardinality failures, unresolved references, closed shape leftovers...) are
//! never errors: they are reported as data inside a [`ValidationResult`](crate::ValidationResult).
//! The types of this module only cover malformed schemas and faults of the collaborators the
//! validator relies on.

use std::error::Error;

/// Main error type for ShEx operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShexError {
    /// Error building a shapes schema.
    #[error(transparent)]
    Parse(#[from] ShexParseError),

    /// Error during validation.
    #[error(transparent)]
    Validation(#[from] ShexValidationError),
}

/// Error raised while building or checking a shapes schema.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShexParseError {
    /// Invalid cardinality.
    #[error("Invalid cardinality: min={min}, max={max}")]
    InvalidCardinality { min: i64, max: i64 },

    /// The same shape label is declared twice.
    #[error("Shape {label} is declared more than once")]
    DuplicateShapeLabel { label: String },

    /// The same triple expression label is declared twice.
    #[error("Triple expression {label} is declared more than once")]
    DuplicateTripleExprLabel { label: String },

    /// Undefined shape reference.
    #[error("Undefined shape reference: {label}")]
    UndefinedShapeRef { label: String },

    /// Undefined triple expression reference.
    #[error("Undefined triple expression reference: {label}")]
    UndefinedTripleExprRef { label: String },

    /// A triple expression includes itself.
    #[error("Triple expression {label} references itself")]
    CyclicTripleExprRef { label: String },

    /// A shape depends on itself through a negation.
    #[error("Shape {label} references itself through a negation")]
    NegatedSelfReference { label: String },

    /// Invalid regex pattern.
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// Invalid shape label serialization.
    #[error("Invalid shape label: {message}")]
    InvalidShapeLabel { message: String },
}

impl ShexParseError {
    /// Creates an invalid cardinality error.
    pub fn invalid_cardinality(min: impl Into<i64>, max: impl Into<i64>) -> Self {
        Self::InvalidCardinality {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Creates a duplicate shape label error.
    pub fn duplicate_shape_label(label: impl ToString) -> Self {
        Self::DuplicateShapeLabel {
            label: label.to_string(),
        }
    }

    /// Creates a duplicate triple expression label error.
    pub fn duplicate_triple_expr_label(label: impl ToString) -> Self {
        Self::DuplicateTripleExprLabel {
            label: label.to_string(),
        }
    }

    /// Creates an undefined shape reference error.
    pub fn undefined_shape_ref(label: impl ToString) -> Self {
        Self::UndefinedShapeRef {
            label: label.to_string(),
        }
    }

    /// Creates an undefined triple expression reference error.
    pub fn undefined_triple_expr_ref(label: impl ToString) -> Self {
        Self::UndefinedTripleExprRef {
            label: label.to_string(),
        }
    }

    /// Creates a cyclic triple expression reference error.
    pub fn cyclic_triple_expr_ref(label: impl ToString) -> Self {
        Self::CyclicTripleExprRef {
            label: label.to_string(),
        }
    }

    /// Creates a negated self reference error.
    pub fn negated_self_reference(label: impl ToString) -> Self {
        Self::NegatedSelfReference {
            label: label.to_string(),
        }
    }

    /// Creates an invalid regex error.
    pub fn invalid_regex(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidRegex {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid shape label error.
    pub fn invalid_shape_label(message: impl Into<String>) -> Self {
        Self::InvalidShapeLabel {
            message: message.into(),
        }
    }
}

/// A shape or triple expression label that is not defined in the schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unresolved reference: {label}")]
pub struct UnresolvedReferenceError {
    /// The label that could not be resolved.
    pub label: String,
}

impl UnresolvedReferenceError {
    /// Creates an unresolved reference error for the given label.
    pub fn new(label: impl ToString) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

/// Fault raised while validating.
///
/// Only failures of the graph collaborator or of the external shape resolver end up here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShexValidationError {
    /// The graph failed to return the neighborhood of a node.
    #[error("Failed to read the neighborhood of {node}: {source}")]
    Graph {
        node: String,
        #[source]
        source: Box<dyn Error + Send + Sync + 'static>,
    },

    /// The external shape resolver failed.
    #[error("External shape resolver failed on {node}: {source}")]
    External {
        node: String,
        #[source]
        source: Box<dyn Error + Send + Sync + 'static>,
    },
}

impl ShexValidationError {
    /// Creates a graph access error.
    pub fn graph(node: impl ToString, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Graph {
            node: node.to_string(),
            source: source.into(),
        }
    }

    /// Creates an external resolver error.
    pub fn external(node: impl ToString, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::External {
            node: node.to_string(),
            source: source.into(),
        }
    }
}
