//! Validation results.
//!
//! A validation never fails for a data-related reason: its outcome is a [`ValidationResult`],
//! either [`Conforms`](ValidationResult::Conforms) with the [`Evidence`] of the match or
//! [`Violates`](ValidationResult::Violates) with the [`ViolationReason`]s.
//!
//! Sub-results follow the declaration order of the schema, so validating the same node twice
//! yields identical results.

use crate::model::{Cardinality, ShapeLabel};
use oxrdf::{NamedNode, Term, Triple};
use std::fmt;

/// Outcome of validating a node against a shape expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum ValidationResult {
    /// The node conforms.
    Conforms(Conformance),
    /// The node does not conform.
    Violates(Violation),
}

impl ValidationResult {
    pub(crate) fn conforming(node: Term, evidence: Evidence) -> Self {
        Self::Conforms(Conformance {
            node,
            shape: None,
            evidence,
        })
    }

    pub(crate) fn violating(node: Term, reasons: Vec<ViolationReason>) -> Self {
        Self::Violates(Violation {
            node,
            shape: None,
            reasons,
        })
    }

    /// Returns true if the node conforms.
    pub fn conforms(&self) -> bool {
        matches!(self, Self::Conforms(_))
    }

    /// The validated node.
    pub fn node(&self) -> &Term {
        match self {
            Self::Conforms(c) => &c.node,
            Self::Violates(v) => &v.node,
        }
    }

    /// The label of the shape the node was validated against, if it was validated through a label.
    pub fn shape(&self) -> Option<&ShapeLabel> {
        match self {
            Self::Conforms(c) => c.shape.as_ref(),
            Self::Violates(v) => v.shape.as_ref(),
        }
    }

    /// The reasons of the violation. Empty if the node conforms.
    pub fn reasons(&self) -> &[ViolationReason] {
        match self {
            Self::Conforms(_) => &[],
            Self::Violates(v) => &v.reasons,
        }
    }

    /// The evidence of conformance, if the node conforms.
    pub fn evidence(&self) -> Option<&Evidence> {
        match self {
            Self::Conforms(c) => Some(&c.evidence),
            Self::Violates(_) => None,
        }
    }

    pub(crate) fn into_reasons(self) -> Vec<ViolationReason> {
        match self {
            Self::Conforms(_) => Vec::new(),
            Self::Violates(v) => v.reasons,
        }
    }

    /// Sets the shape label if none is set yet.
    pub(crate) fn labeled(mut self, label: &ShapeLabel) -> Self {
        let shape = match &mut self {
            Self::Conforms(c) => &mut c.shape,
            Self::Violates(v) => &mut v.shape,
        };
        if shape.is_none() {
            *shape = Some(label.clone());
        }
        self
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conforms(c) => {
                write!(f, "{} conforms", c.node)?;
                if let Some(shape) = &c.shape {
                    write!(f, " to {shape}")?;
                }
                Ok(())
            }
            Self::Violates(v) => {
                write!(f, "{} does not conform", v.node)?;
                if let Some(shape) = &v.shape {
                    write!(f, " to {shape}")?;
                }
                for reason in &v.reasons {
                    write!(f, "\n  - {reason}")?;
                }
                Ok(())
            }
        }
    }
}

/// Successful validation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Conformance {
    /// The validated node.
    #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
    pub node: Term,
    /// The shape label, when validated through a label.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub shape: Option<ShapeLabel>,
    /// Why the node conforms.
    pub evidence: Evidence,
}

/// Failed validation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Violation {
    /// The validated node.
    #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
    pub node: Term,
    /// The shape label, when validated through a label.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub shape: Option<ShapeLabel>,
    /// Why the node does not conform.
    pub reasons: Vec<ViolationReason>,
}

/// Why a node conforms to a shape expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum Evidence {
    /// The node satisfies a node constraint.
    NodeConstraint,
    /// The neighborhood of the node satisfies a shape.
    Shape {
        /// How the triples were assigned to the triple expression. `None` for shapes without one.
        #[cfg_attr(
            feature = "serde",
            serde(default, skip_serializing_if = "Option::is_none")
        )]
        solution: Option<TripleExprSolution>,
        /// Triples left unmatched (allowed by `EXTRA` or because the shape is open).
        #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display::vec"))]
        unmatched: Vec<Triple>,
    },
    /// All conjuncts conform, in declaration order.
    And {
        /// Results of the conjuncts.
        results: Vec<ValidationResult>,
    },
    /// The first conforming disjunct.
    Or {
        /// Position of the disjunct.
        index: usize,
        /// Its result.
        result: Box<ValidationResult>,
    },
    /// The negated expression does not conform.
    Not,
    /// The same node is already being validated against the same shape higher in the recursion.
    RecursionAssumed,
    /// The external shape resolver accepted the node.
    External,
}

/// Assignment of triples to a triple expression, mirroring its structure.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum TripleExprSolution {
    /// Triples matched by a triple constraint.
    TripleConstraint {
        /// Predicate of the constraint.
        #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
        predicate: NamedNode,
        /// Whether the constraint is inverse.
        inverse: bool,
        /// The matched triples.
        matches: Vec<TripleMatch>,
    },
    /// Solutions of the sub-expressions of an `EachOf`.
    EachOf {
        /// One per sub-expression.
        solutions: Vec<TripleExprSolution>,
    },
    /// Solutions of the sub-expressions of a `OneOf`.
    OneOf {
        /// One per sub-expression.
        solutions: Vec<TripleExprSolution>,
    },
}

impl TripleExprSolution {
    /// All matched triples, in order.
    pub fn triples(&self) -> Vec<&Triple> {
        let mut triples = Vec::new();
        self.collect_triples(&mut triples);
        triples
    }

    fn collect_triples<'a>(&'a self, triples: &mut Vec<&'a Triple>) {
        match self {
            Self::TripleConstraint { matches, .. } => {
                triples.extend(matches.iter().map(|m| &m.triple));
            }
            Self::EachOf { solutions } | Self::OneOf { solutions } => {
                for solution in solutions {
                    solution.collect_triples(triples);
                }
            }
        }
    }
}

/// A triple matched by a triple constraint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TripleMatch {
    /// The triple.
    #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
    pub triple: Triple,
    /// Result of the value expression on the other end of the triple, if the constraint has one.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub result: Option<Box<ValidationResult>>,
}

/// Why a node does not conform.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
#[non_exhaustive]
pub enum ViolationReason {
    /// A shape or triple expression label is not defined in the schema.
    UnresolvedReference {
        /// The label.
        label: String,
    },
    /// The number of triples matching a triple constraint is outside of its cardinality.
    CardinalityViolation {
        /// Predicate of the constraint.
        #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
        predicate: NamedNode,
        /// Whether the constraint is inverse.
        inverse: bool,
        /// Number of conforming triples.
        count: usize,
        /// The allowed range.
        cardinality: Cardinality,
    },
    /// A node constraint failed, or the value of a triple conforms to none of the constraints on its
    /// predicate.
    ValueMismatch {
        /// The offending value.
        #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
        value: Term,
        /// Description of the failure.
        message: String,
        /// The triple carrying the value, for neighborhood checks.
        #[cfg_attr(
            feature = "serde",
            serde(
                default,
                skip_serializing_if = "Option::is_none",
                with = "crate::serialization::display::option"
            )
        )]
        triple: Option<Triple>,
        /// Failures of the value against each candidate constraint.
        #[cfg_attr(
            feature = "serde",
            serde(default, skip_serializing_if = "Vec::is_empty")
        )]
        causes: Vec<ViolationReason>,
    },
    /// A closed shape has a triple whose predicate is not allowed.
    UnexpectedPredicate {
        /// The leftover triple.
        #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
        triple: Triple,
    },
    /// No assignment of the neighborhood satisfies the triple expression.
    NoSatisfyingPartition {
        /// Number of assignments tried.
        combinations: usize,
    },
    /// The partition search budget ran out before an outcome was found.
    SearchBudgetExceeded {
        /// The budget.
        budget: usize,
    },
    /// Shape references are nested deeper than allowed.
    RecursionDepthExceeded {
        /// Depth reached.
        depth: usize,
        /// Allowed depth.
        limit: usize,
    },
    /// The expression under a `NOT` conforms.
    NegationViolated,
    /// A semantic action handler rejected the match.
    SemanticActionFailed {
        /// Name of the action.
        #[cfg_attr(feature = "serde", serde(with = "crate::serialization::display"))]
        action: NamedNode,
    },
    /// The external shape resolver rejected the node or none is configured.
    ExternalShapeFailed {
        /// Description of the failure.
        message: String,
    },
}

impl ViolationReason {
    pub(crate) fn value_mismatch(value: &Term, message: impl Into<String>) -> Self {
        Self::ValueMismatch {
            value: value.clone(),
            message: message.into(),
            triple: None,
            causes: Vec::new(),
        }
    }

    /// Returns true if the reason means the validation was cut short rather than decided.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            Self::SearchBudgetExceeded { .. } | Self::RecursionDepthExceeded { .. }
        )
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedReference { label } => write!(f, "unresolved reference {label}"),
            Self::CardinalityViolation {
                predicate,
                inverse,
                count,
                cardinality,
            } => write!(
                f,
                "{}{predicate} matched {count} time(s), expected {cardinality}",
                if *inverse { "^" } else { "" }
            ),
            Self::ValueMismatch {
                value,
                message,
                triple,
                causes,
            } => {
                if let Some(triple) = triple {
                    write!(f, "{triple}: ")?;
                }
                write!(f, "{value} {message}")?;
                for cause in causes {
                    write!(f, " ({cause})")?;
                }
                Ok(())
            }
            Self::UnexpectedPredicate { triple } => {
                write!(f, "unexpected triple {triple} in closed shape")
            }
            Self::NoSatisfyingPartition { combinations } => write!(
                f,
                "no assignment of the neighborhood satisfies the triple expression ({combinations} tried)"
            ),
            Self::SearchBudgetExceeded { budget } => {
                write!(f, "partition search budget of {budget} exhausted")
            }
            Self::RecursionDepthExceeded { depth, limit } => {
                write!(f, "recursion depth {depth} exceeds limit {limit}")
            }
            Self::NegationViolated => write!(f, "negated shape expression conforms"),
            Self::SemanticActionFailed { action } => {
                write!(f, "semantic action {action} failed")
            }
            Self::ExternalShapeFailed { message } => write!(f, "external shape: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Literal;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new(format!("http://example.org/{name}")).unwrap()
    }

    #[test]
    fn test_accessors() {
        let node = Term::from(ex("alice"));
        let result = ValidationResult::conforming(node.clone(), Evidence::NodeConstraint)
            .labeled(&ShapeLabel::from(ex("S")));
        assert!(result.conforms());
        assert_eq!(result.node(), &node);
        assert_eq!(result.shape(), Some(&ShapeLabel::from(ex("S"))));
        assert!(result.reasons().is_empty());
        assert_eq!(result.evidence(), Some(&Evidence::NodeConstraint));
    }

    #[test]
    fn test_labeled_keeps_innermost_label() {
        let result = ValidationResult::violating(Term::from(ex("n")), vec![])
            .labeled(&ShapeLabel::from(ex("Inner")))
            .labeled(&ShapeLabel::from(ex("Outer")));
        assert_eq!(result.shape(), Some(&ShapeLabel::from(ex("Inner"))));
    }

    #[test]
    fn test_display() {
        let triple = Triple::new(ex("alice"), ex("age"), Literal::new_simple_literal("30"));
        let result = ValidationResult::violating(
            Term::from(ex("alice")),
            vec![ViolationReason::UnexpectedPredicate { triple }],
        )
        .labeled(&ShapeLabel::from(ex("S")));
        assert_eq!(
            result.to_string(),
            "<http://example.org/alice> does not conform to <http://example.org/S>\n  - unexpected triple <http://example.org/alice> <http://example.org/age> \"30\" in closed shape"
        );
        let reason = ViolationReason::CardinalityViolation {
            predicate: ex("name"),
            inverse: false,
            count: 2,
            cardinality: Cardinality::exactly(1),
        };
        assert_eq!(
            reason.to_string(),
            "<http://example.org/name> matched 2 time(s), expected {1}"
        );
    }

    #[test]
    fn test_solution_triples_in_declaration_order() {
        let t1 = Triple::new(ex("n"), ex("a"), ex("x"));
        let t2 = Triple::new(ex("n"), ex("b"), ex("y"));
        let solution = TripleExprSolution::EachOf {
            solutions: vec![
                TripleExprSolution::TripleConstraint {
                    predicate: ex("b"),
                    inverse: false,
                    matches: vec![TripleMatch {
                        triple: t2.clone(),
                        result: None,
                    }],
                },
                TripleExprSolution::TripleConstraint {
                    predicate: ex("a"),
                    inverse: false,
                    matches: vec![TripleMatch {
                        triple: t1.clone(),
                        result: None,
                    }],
                },
            ],
        };
        assert_eq!(solution.triples(), vec![&t2, &t1]);
    }
}
