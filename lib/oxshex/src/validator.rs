//! ShEx validator entry point.

use crate::error::ShexValidationError;
use crate::extension::{ExternalShapeResolver, Extensions, SemanticActionHandler};
use crate::graph::ShexGraph;
use crate::limits::ValidationLimits;
use crate::matcher::Matcher;
use crate::model::{ShapeExpression, ShapeLabel};
use crate::result::{ValidationResult, ViolationReason};
use crate::schema::ShapesSchema;
use oxrdf::{NamedNode, Term};
use std::sync::Arc;
use tracing::debug;

/// Validates RDF nodes against the shapes of a [`ShapesSchema`].
///
/// Every call starts from a fresh recursion stack and search budget, so a validator can be
/// reused and shared between threads.
///
/// ```
/// use oxrdf::{Graph, Literal, NamedNode, Term, Triple};
/// use oxshex::{
///     Cardinality, NodeConstraint, NodeKind, Shape, ShapeExpression, ShapeLabel,
///     ShapesSchemaBuilder, ShexValidator, TripleConstraint,
/// };
///
/// let name = NamedNode::new("http://example.org/name")?;
/// let label = ShapeLabel::from(NamedNode::new("http://example.org/Person")?);
/// let mut builder = ShapesSchemaBuilder::new();
/// builder.add_shape(
///     label.clone(),
///     ShapeExpression::Shape(Shape::with_expression(
///         TripleConstraint::with_value_expr(
///             name.clone(),
///             ShapeExpression::NodeConstraint(NodeConstraint::with_node_kind(NodeKind::Literal)),
///         )
///         .with_cardinality(Cardinality::exactly(1)),
///     )),
/// )?;
/// let validator = ShexValidator::new(builder.build_checked()?);
///
/// let alice = NamedNode::new("http://example.org/alice")?;
/// let mut graph = Graph::new();
/// graph.insert(&Triple::new(alice.clone(), name, Literal::new_simple_literal("Alice")));
///
/// assert!(validator.validate(&graph, &Term::from(alice), &label)?.conforms());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct ShexValidator {
    schema: Arc<ShapesSchema>,
    limits: ValidationLimits,
    extensions: Extensions,
}

impl ShexValidator {
    /// Creates a new validator with the given shapes schema and the default limits.
    pub fn new(schema: impl Into<Arc<ShapesSchema>>) -> Self {
        Self {
            schema: schema.into(),
            limits: ValidationLimits::default(),
            extensions: Extensions::default(),
        }
    }

    /// Sets the resource limits applied to each validation call.
    #[must_use]
    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the resolver deciding conformance to `EXTERNAL` shapes.
    #[must_use]
    pub fn with_external_resolver(
        mut self,
        resolver: impl ExternalShapeResolver + 'static,
    ) -> Self {
        self.extensions.set_external(Arc::new(resolver));
        self
    }

    /// Registers the handler of the semantic actions named `name`.
    #[must_use]
    pub fn with_semantic_action(
        mut self,
        name: NamedNode,
        handler: impl SemanticActionHandler + 'static,
    ) -> Self {
        self.extensions.add_action(name, Arc::new(handler));
        self
    }

    /// Returns a reference to the shapes schema.
    pub fn schema(&self) -> &ShapesSchema {
        &self.schema
    }

    /// Returns the limits applied to each validation call.
    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validates `node` against the shape labeled `label`.
    ///
    /// Non-conformance is reported in the returned [`ValidationResult`]. Errors are only returned
    /// when the graph or the external shape resolver fails.
    pub fn validate<G: ShexGraph + ?Sized>(
        &self,
        graph: &G,
        node: &Term,
        label: &ShapeLabel,
    ) -> Result<ValidationResult, ShexValidationError> {
        debug!(%node, shape = %label, "validating node");
        Matcher::new(&self.schema, graph, &self.extensions, self.limits.clone())
            .validate_label(node, label)
    }

    /// Validates `node` against the start shape of the schema.
    pub fn validate_start<G: ShexGraph + ?Sized>(
        &self,
        graph: &G,
        node: &Term,
    ) -> Result<ValidationResult, ShexValidationError> {
        match self.schema.start() {
            Some(label) => self.validate(graph, node, label),
            None => Ok(ValidationResult::violating(
                node.clone(),
                vec![ViolationReason::UnresolvedReference {
                    label: "START".into(),
                }],
            )),
        }
    }

    /// Validates `node` against an anonymous shape expression.
    ///
    /// References inside `expression` are resolved against the schema.
    pub fn validate_expression<G: ShexGraph + ?Sized>(
        &self,
        graph: &G,
        node: &Term,
        expression: &ShapeExpression,
    ) -> Result<ValidationResult, ShexValidationError> {
        debug!(%node, "validating node against an anonymous shape expression");
        Matcher::new(&self.schema, graph, &self.extensions, self.limits.clone())
            .validate_expression(node, expression)
    }

    /// Returns whether `node` conforms to the shape labeled `label`.
    pub fn conforms<G: ShexGraph + ?Sized>(
        &self,
        graph: &G,
        node: &Term,
        label: &ShapeLabel,
    ) -> Result<bool, ShexValidationError> {
        Ok(self.validate(graph, node, label)?.conforms())
    }
}
