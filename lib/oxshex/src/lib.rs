//! ShEx (Shape Expressions) validation for RDF graphs.
//!
//! This crate validates nodes of an RDF graph against the shapes of a [ShEx](https://shex.io/)
//! schema. It works on an already built abstract syntax: the [`ShapesSchemaBuilder`] is the
//! boundary with whatever parser produced it.
//!
//! # Core Concepts
//!
//! - **Schema**: an immutable collection of shape definitions ([`ShapesSchema`])
//! - **Shape Expression**: constraints on RDF nodes ([`ShapeExpression`])
//! - **Validation**: checking if nodes conform to shapes ([`ShexValidator`])
//! - **Result**: conformance with evidence, or violation with reasons ([`ValidationResult`])
//!
//! Shapes may reference each other recursively. A node whose validation against a shape is
//! already in progress is assumed to conform to it, which makes cyclic data terminate.
//!
//! # Quick Start
//!
//! ```
//! use oxrdf::{Graph, Literal, NamedNode, Term, Triple};
//! use oxshex::{
//!     Cardinality, NodeConstraint, NodeKind, Shape, ShapeLabel, ShapesSchemaBuilder,
//!     ShexValidator, TripleConstraint,
//! };
//!
//! let name = NamedNode::new("http://example.org/name")?;
//! let person = ShapeLabel::from(NamedNode::new("http://example.org/Person")?);
//!
//! let mut builder = ShapesSchemaBuilder::new();
//! builder.add_shape(
//!     person.clone(),
//!     Shape::with_expression(
//!         TripleConstraint::with_value_expr(
//!             name.clone(),
//!             NodeConstraint::with_node_kind(NodeKind::Literal),
//!         )
//!         .with_cardinality(Cardinality::exactly(1)),
//!     )
//!     .closed(),
//! )?;
//! let validator = ShexValidator::new(builder.build_checked()?);
//!
//! let alice = NamedNode::new("http://example.org/alice")?;
//! let mut graph = Graph::new();
//! graph.insert(&Triple::new(alice.clone(), name, Literal::new_simple_literal("Alice")));
//!
//! let result = validator.validate(&graph, &Term::from(alice), &person)?;
//! if !result.conforms() {
//!     for reason in result.reasons() {
//!         println!("Validation error: {reason}");
//!     }
//! }
//! assert!(result.conforms());
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```

#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod extension;
mod graph;
mod limits;
mod matcher;
mod model;
mod node_constraint;
mod partition;
mod result;
mod schema;
#[cfg(feature = "serde")]
mod serialization;
mod validator;

pub use error::{ShexError, ShexParseError, ShexValidationError, UnresolvedReferenceError};
pub use extension::{ExternalShapeResolver, SemanticActionContext, SemanticActionHandler};
pub use graph::{Neighborhood, NeighborhoodArc, ShexGraph};
pub use limits::{
    DEFAULT_MAX_PARTITION_COMBINATIONS, DEFAULT_MAX_RECURSION_DEPTH, DEFAULT_MAX_REGEX_LENGTH,
    ValidationLimitError, ValidationLimits,
};
pub use model::{
    Annotation, Cardinality, NodeConstraint, NodeKind, NumericFacet, NumericLiteral,
    SemanticAction, Shape, ShapeExpression, ShapeLabel, StringFacet, TripleConstraint,
    TripleExprGroup, TripleExprLabel, TripleExpression, ValueSetValue,
};
pub use result::{
    Conformance, Evidence, TripleExprSolution, TripleMatch, ValidationResult, Violation,
    ViolationReason,
};
pub use schema::{BlankNodeCounter, ShapesSchema, ShapesSchemaBuilder};
pub use validator::ShexValidator;
