//! ShEx shape model types.
//!
//! This module defines the abstract syntax of shape expressions:
//! - [`ShapeLabel`] - Identifier for shapes and triple expressions (IRI or blank node)
//! - [`ShapeExpression`] - Main shape expression type (union of all shape types)
//! - [`TripleExpression`] - Constraints on the neighborhood of a node
//! - [`NodeConstraint`] - Constraints on node values (datatype, pattern, value set, etc.)
//! - [`Cardinality`] - Min/max occurrences for triple expressions

use crate::error::ShexParseError;
use oxrdf::{BlankNode, NamedNode, NamedOrBlankNode, Term};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a shape (shape label in ShEx terminology).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShapeLabel {
    /// Named shape (IRI).
    Iri(NamedNode),
    /// Anonymous shape (blank node).
    BNode(BlankNode),
}

impl ShapeLabel {
    /// Creates a shape label from a named or blank node.
    pub fn from_named_or_blank(node: NamedOrBlankNode) -> Self {
        match node {
            NamedOrBlankNode::NamedNode(n) => Self::Iri(n),
            NamedOrBlankNode::BlankNode(b) => Self::BNode(b),
        }
    }

    /// Converts to a Term.
    pub fn to_term(&self) -> Term {
        match self {
            Self::Iri(n) => n.clone().into(),
            Self::BNode(b) => b.clone().into(),
        }
    }

    /// Returns the shape label as a named node if it is one.
    pub fn as_iri(&self) -> Option<&NamedNode> {
        match self {
            Self::Iri(n) => Some(n),
            Self::BNode(_) => None,
        }
    }

    /// Returns the shape label as a blank node if it is one.
    pub fn as_bnode(&self) -> Option<&BlankNode> {
        match self {
            Self::Iri(_) => None,
            Self::BNode(b) => Some(b),
        }
    }
}

impl From<NamedNode> for ShapeLabel {
    fn from(n: NamedNode) -> Self {
        Self::Iri(n)
    }
}

impl From<BlankNode> for ShapeLabel {
    fn from(b: BlankNode) -> Self {
        Self::BNode(b)
    }
}

impl fmt::Display for ShapeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(n) => write!(f, "<{}>", n.as_str()),
            Self::BNode(b) => write!(f, "_:{}", b.as_str()),
        }
    }
}

impl FromStr for ShapeLabel {
    type Err = ShexParseError;

    /// Parses `<iri>` or `_:id`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('<') {
            NamedNode::from_str(s)
                .map(Self::Iri)
                .map_err(|e| ShexParseError::invalid_shape_label(e.to_string()))
        } else if s.starts_with("_:") {
            BlankNode::from_str(s)
                .map(Self::BNode)
                .map_err(|e| ShexParseError::invalid_shape_label(e.to_string()))
        } else {
            Err(ShexParseError::invalid_shape_label(format!(
                "'{s}' is neither an IRI nor a blank node"
            )))
        }
    }
}

/// Label of a triple expression that can be reused through [`TripleExpression::TripleExprRef`].
pub type TripleExprLabel = ShapeLabel;

/// Main shape expression type.
///
/// ShEx shapes can be combined and composed using various operators.
/// This enum represents all possible shape expression types.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeExpression {
    /// Conjunction of shape expressions (AND).
    ShapeAnd(Vec<ShapeExpression>),

    /// Disjunction of shape expressions (OR).
    ShapeOr(Vec<ShapeExpression>),

    /// Negation of a shape expression (NOT).
    ShapeNot(Box<ShapeExpression>),

    /// Node constraint - validates properties of the focus node itself.
    NodeConstraint(NodeConstraint),

    /// Shape with a triple expression - validates the neighborhood of the focus node.
    Shape(Shape),

    /// Shape whose definition lives outside of the schema.
    ShapeExternal,

    /// Reference to another shape by label.
    ShapeRef(ShapeLabel),
}

impl ShapeExpression {
    /// Creates a reference to the shape with the given label.
    pub fn shape_ref(label: impl Into<ShapeLabel>) -> Self {
        Self::ShapeRef(label.into())
    }

    /// Returns true if this is a shape reference.
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::ShapeRef(_))
    }

    /// Returns the shape label if this is a reference.
    pub fn as_label(&self) -> Option<&ShapeLabel> {
        match self {
            Self::ShapeRef(label) => Some(label),
            _ => None,
        }
    }

    /// Collects all shape references in this expression (recursive).
    ///
    /// References reached through triple expression references are not followed.
    pub fn collect_refs(&self) -> Vec<&ShapeLabel> {
        let mut refs = Vec::new();
        self.visit_refs(&mut |label, _| refs.push(label), false);
        refs
    }

    /// Calls `visitor` on every shape reference with a flag telling if it is under a negation.
    pub(crate) fn visit_refs<'a>(
        &'a self,
        visitor: &mut impl FnMut(&'a ShapeLabel, bool),
        negated: bool,
    ) {
        match self {
            Self::ShapeAnd(shapes) | Self::ShapeOr(shapes) => {
                for shape in shapes {
                    shape.visit_refs(&mut *visitor, negated);
                }
            }
            Self::ShapeNot(shape) => shape.visit_refs(&mut *visitor, true),
            Self::ShapeRef(label) => visitor(label, negated),
            Self::Shape(shape) => {
                if let Some(expression) = &shape.expression {
                    expression.visit_value_exprs(&mut |value_expr| {
                        value_expr.visit_refs(&mut *visitor, negated)
                    });
                }
            }
            Self::NodeConstraint(_) | Self::ShapeExternal => {}
        }
    }
}

impl From<NodeConstraint> for ShapeExpression {
    fn from(constraint: NodeConstraint) -> Self {
        Self::NodeConstraint(constraint)
    }
}

impl From<Shape> for ShapeExpression {
    fn from(shape: Shape) -> Self {
        Self::Shape(shape)
    }
}

/// Shape with a triple expression.
///
/// Validates the triples around the focus node: the triple expression must be satisfied by a
/// partition of the neighborhood and, if the shape is closed, the remaining outgoing triples must
/// use predicates listed in `extra`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shape {
    /// Triple expression the neighborhood must satisfy.
    pub expression: Option<TripleExpression>,

    /// Whether this is a closed shape (no extra properties allowed).
    pub closed: bool,

    /// Predicates whose non matching triples are allowed to remain unmatched.
    pub extra: Vec<NamedNode>,

    /// Semantic actions run when the shape is satisfied.
    pub sem_acts: Vec<SemanticAction>,

    /// Annotations for this shape.
    pub annotations: Vec<Annotation>,
}

impl Shape {
    /// Creates a new empty shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shape with the given triple expression.
    pub fn with_expression(expression: impl Into<TripleExpression>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::default()
        }
    }

    /// Marks the shape as closed.
    #[must_use]
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Adds a predicate to the `EXTRA` list.
    #[must_use]
    pub fn with_extra(mut self, predicate: NamedNode) -> Self {
        self.extra.push(predicate);
        self
    }

    /// Adds a semantic action.
    #[must_use]
    pub fn with_sem_act(mut self, action: SemanticAction) -> Self {
        self.sem_acts.push(action);
        self
    }

    /// Returns true if this shape has no triple expression.
    pub fn is_empty(&self) -> bool {
        self.expression.is_none()
    }
}

/// Triple expression: constraints on the neighborhood of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum TripleExpression {
    /// A predicate with a value expression and a cardinality.
    TripleConstraint(TripleConstraint),

    /// All sub-expressions, each matched by a disjoint part of the neighborhood.
    EachOf(TripleExprGroup),

    /// Exactly one sub-expression per repetition.
    OneOf(TripleExprGroup),

    /// Reference to a labeled triple expression of the schema.
    TripleExprRef(TripleExprLabel),
}

impl TripleExpression {
    /// Creates an `EachOf` with the default cardinality.
    pub fn each_of(expressions: impl IntoIterator<Item = TripleExpression>) -> Self {
        Self::EachOf(TripleExprGroup::new(expressions))
    }

    /// Creates a `OneOf` with the default cardinality.
    pub fn one_of(expressions: impl IntoIterator<Item = TripleExpression>) -> Self {
        Self::OneOf(TripleExprGroup::new(expressions))
    }

    /// Creates a reference to a labeled triple expression.
    pub fn reference(label: impl Into<TripleExprLabel>) -> Self {
        Self::TripleExprRef(label.into())
    }

    /// Returns the label under which this expression is declared, if any.
    pub fn id(&self) -> Option<&TripleExprLabel> {
        match self {
            Self::TripleConstraint(tc) => tc.id.as_ref(),
            Self::EachOf(group) | Self::OneOf(group) => group.id.as_ref(),
            Self::TripleExprRef(_) => None,
        }
    }

    /// Calls `visitor` on this expression and all its nested expressions, depth first.
    ///
    /// References are not followed.
    pub fn walk<'a>(&'a self, visitor: &mut impl FnMut(&'a TripleExpression)) {
        visitor(self);
        if let Self::EachOf(group) | Self::OneOf(group) = self {
            for expression in &group.expressions {
                expression.walk(&mut *visitor);
            }
        }
    }

    fn visit_value_exprs<'a>(&'a self, visitor: &mut impl FnMut(&'a ShapeExpression)) {
        self.walk(&mut |expression| {
            if let Self::TripleConstraint(tc) = expression {
                if let Some(value_expr) = &tc.value_expr {
                    visitor(&**value_expr);
                }
            }
        });
    }
}

impl From<TripleConstraint> for TripleExpression {
    fn from(constraint: TripleConstraint) -> Self {
        Self::TripleConstraint(constraint)
    }
}

/// Shared payload of `EachOf` and `OneOf`.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleExprGroup {
    /// Optional label used by triple expression references.
    pub id: Option<TripleExprLabel>,

    /// Sub-expressions, in declaration order.
    pub expressions: Vec<TripleExpression>,

    /// Number of repetitions of the whole group.
    pub cardinality: Cardinality,

    /// Semantic actions of the group.
    pub sem_acts: Vec<SemanticAction>,

    /// Annotations of the group.
    pub annotations: Vec<Annotation>,
}

impl TripleExprGroup {
    /// Creates a group matched exactly once.
    pub fn new(expressions: impl IntoIterator<Item = TripleExpression>) -> Self {
        Self {
            id: None,
            expressions: expressions.into_iter().collect(),
            cardinality: Cardinality::default(),
            sem_acts: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Sets the cardinality for this group.
    #[must_use]
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Sets the label of this group.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<TripleExprLabel>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Constraint on a triple pattern.
///
/// Specifies a predicate and optional value expression that values must match,
/// along with cardinality constraints (min/max occurrences).
#[derive(Debug, Clone, PartialEq)]
pub struct TripleConstraint {
    /// Optional label used by triple expression references.
    pub id: Option<TripleExprLabel>,

    /// Predicate IRI for this constraint.
    pub predicate: NamedNode,

    /// Whether this constraint is inverse (focus node is object).
    pub inverse: bool,

    /// Optional shape expression that values must satisfy.
    pub value_expr: Option<Box<ShapeExpression>>,

    /// Cardinality constraint (min/max occurrences).
    pub cardinality: Cardinality,

    /// Semantic actions run for each matched triple.
    pub sem_acts: Vec<SemanticAction>,

    /// Annotations for this constraint.
    pub annotations: Vec<Annotation>,
}

impl TripleConstraint {
    /// Creates a new triple constraint with the given predicate.
    pub fn new(predicate: NamedNode) -> Self {
        Self {
            id: None,
            predicate,
            inverse: false,
            value_expr: None,
            cardinality: Cardinality::default(),
            sem_acts: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Creates a new triple constraint with predicate and value expression.
    pub fn with_value_expr(predicate: NamedNode, value_expr: impl Into<ShapeExpression>) -> Self {
        Self {
            value_expr: Some(Box::new(value_expr.into())),
            ..Self::new(predicate)
        }
    }

    /// Sets the cardinality for this constraint.
    #[must_use]
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Sets whether this constraint is inverse.
    #[must_use]
    pub fn with_inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    /// Sets the label of this constraint.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<TripleExprLabel>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a semantic action.
    #[must_use]
    pub fn with_sem_act(mut self, action: SemanticAction) -> Self {
        self.sem_acts.push(action);
        self
    }
}

/// Cardinality constraint (min/max occurrences).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "crate::serialization::CardinalityRepr",
        into = "crate::serialization::CardinalityRepr"
    )
)]
pub struct Cardinality {
    /// Minimum number of occurrences (default: 1).
    pub min: u32,

    /// Maximum number of occurrences (None = unbounded, default: 1).
    pub max: Option<u32>,
}

impl Cardinality {
    /// Creates a cardinality constraint with min and max.
    pub fn new(min: u32, max: Option<u32>) -> Result<Self, ShexParseError> {
        if let Some(max_val) = max {
            if max_val < min {
                return Err(ShexParseError::invalid_cardinality(min, max_val));
            }
        }
        Ok(Self { min, max })
    }

    /// Creates a cardinality from ShExJ style bounds, where a `max` of `-1` means unbounded.
    pub fn from_bounds(min: i64, max: i64) -> Result<Self, ShexParseError> {
        let invalid = || ShexParseError::invalid_cardinality(min, max);
        let min_val = u32::try_from(min).map_err(|_| invalid())?;
        let max_val = if max == -1 {
            None
        } else {
            Some(u32::try_from(max).map_err(|_| invalid())?)
        };
        Self::new(min_val, max_val).map_err(|_| invalid())
    }

    /// Creates a cardinality constraint for exactly n occurrences.
    pub fn exactly(n: u32) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// Creates a cardinality constraint for 0 or 1 occurrence (?).
    pub fn optional() -> Self {
        Self {
            min: 0,
            max: Some(1),
        }
    }

    /// Creates a cardinality constraint for 0 or more occurrences (*).
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// Creates a cardinality constraint for 1 or more occurrences (+).
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Returns true if this cardinality allows the given count.
    pub fn allows(&self, count: usize) -> bool {
        count >= self.min as usize && self.max.is_none_or(|max| count <= max as usize)
    }

    /// Returns true if this is the default cardinality (exactly 1).
    pub fn is_default(&self) -> bool {
        self.min == 1 && self.max == Some(1)
    }

    /// The upper bound in ShExJ form: `-1` when unbounded.
    pub fn max_bound(&self) -> i64 {
        self.max.map_or(-1, i64::from)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::exactly(1)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (0, None) => write!(f, "*"),
            (1, None) => write!(f, "+"),
            (0, Some(1)) => write!(f, "?"),
            (min, None) => write!(f, "{{{min},}}"),
            (min, Some(max)) if min == max => write!(f, "{{{min}}}"),
            (min, Some(max)) => write!(f, "{{{min},{max}}}"),
        }
    }
}

/// Node constraint - validates properties of nodes.
///
/// Can constrain node kind, datatype, string facets (length, pattern),
/// numeric facets (min/max), and value sets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeConstraint {
    /// Required node kind (IRI, BlankNode, Literal, etc.).
    pub node_kind: Option<NodeKind>,

    /// Required datatype for literals.
    pub datatype: Option<NamedNode>,

    /// String facets (length, pattern).
    pub string_facets: Vec<StringFacet>,

    /// Numeric facets (min/max values, digits).
    pub numeric_facets: Vec<NumericFacet>,

    /// Value set constraint. Empty means no restriction.
    pub values: Vec<ValueSetValue>,
}

impl NodeConstraint {
    /// Creates a new empty node constraint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node constraint with the given node kind.
    pub fn with_node_kind(node_kind: NodeKind) -> Self {
        Self {
            node_kind: Some(node_kind),
            ..Self::default()
        }
    }

    /// Creates a node constraint with the given datatype.
    pub fn with_datatype(datatype: NamedNode) -> Self {
        Self {
            datatype: Some(datatype),
            ..Self::default()
        }
    }

    /// Creates a node constraint with the given value set.
    pub fn with_values(values: impl IntoIterator<Item = ValueSetValue>) -> Self {
        Self {
            values: values.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Adds a string facet.
    #[must_use]
    pub fn with_string_facet(mut self, facet: StringFacet) -> Self {
        self.string_facets.push(facet);
        self
    }

    /// Adds a numeric facet.
    #[must_use]
    pub fn with_numeric_facet(mut self, facet: NumericFacet) -> Self {
        self.numeric_facets.push(facet);
        self
    }

    /// Adds a value to the value set.
    pub fn add_value(&mut self, value: ValueSetValue) {
        self.values.push(value);
    }

    /// Returns true if this constraint is empty.
    pub fn is_empty(&self) -> bool {
        self.node_kind.is_none()
            && self.datatype.is_none()
            && self.string_facets.is_empty()
            && self.numeric_facets.is_empty()
            && self.values.is_empty()
    }
}

/// Node kind constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// IRI node.
    Iri,
    /// Blank node.
    BNode,
    /// Literal value.
    Literal,
    /// Non-literal (IRI or blank node).
    NonLiteral,
}

impl NodeKind {
    /// Returns true if the given term matches this node kind.
    pub fn matches(&self, term: &Term) -> bool {
        match self {
            Self::Iri => matches!(term, Term::NamedNode(_)),
            Self::BNode => matches!(term, Term::BlankNode(_)),
            Self::Literal => matches!(term, Term::Literal(_)),
            Self::NonLiteral => matches!(term, Term::NamedNode(_) | Term::BlankNode(_)),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri => write!(f, "IRI"),
            Self::BNode => write!(f, "BNODE"),
            Self::Literal => write!(f, "LITERAL"),
            Self::NonLiteral => write!(f, "NONLITERAL"),
        }
    }
}

/// String facet constraint (length, pattern).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringFacet {
    /// Exact string length.
    Length(usize),
    /// Minimum string length.
    MinLength(usize),
    /// Maximum string length.
    MaxLength(usize),
    /// Regular expression pattern.
    Pattern {
        /// Regex pattern.
        pattern: String,
        /// Optional regex flags (`i`, `m`, `s`, `x`).
        flags: Option<String>,
    },
}

/// Numeric facet constraint (min/max values).
#[derive(Debug, Clone, PartialEq)]
pub enum NumericFacet {
    /// Minimum inclusive value.
    MinInclusive(NumericLiteral),
    /// Minimum exclusive value.
    MinExclusive(NumericLiteral),
    /// Maximum inclusive value.
    MaxInclusive(NumericLiteral),
    /// Maximum exclusive value.
    MaxExclusive(NumericLiteral),
    /// Total number of digits.
    TotalDigits(u32),
    /// Number of fractional digits.
    FractionDigits(u32),
}

/// Numeric literal value for comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericLiteral {
    /// The literal value.
    pub value: oxrdf::Literal,
}

impl NumericLiteral {
    /// Creates a new numeric literal.
    pub fn new(value: oxrdf::Literal) -> Self {
        Self { value }
    }
}

impl From<i64> for NumericLiteral {
    fn from(value: i64) -> Self {
        Self::new(value.into())
    }
}

/// Value in a value set constraint.
///
/// A stem of `None` in a range is the `.` wildcard: every IRI (or literal, or language tag)
/// matches, except the exclusions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueSetValue {
    /// Exact RDF term.
    ObjectValue(Term),

    /// Exact language tag (`@en`).
    Language(String),

    /// IRI stem (prefix match).
    IriStem(String),

    /// IRI stem with exclusions.
    IriStemRange {
        /// Base stem to match, `None` for any IRI.
        stem: Option<String>,
        /// Values to exclude.
        exclusions: Vec<ValueSetValue>,
    },

    /// Literal stem (lexical form prefix match).
    LiteralStem(String),

    /// Literal stem with exclusions.
    LiteralStemRange {
        /// Base stem to match, `None` for any literal.
        stem: Option<String>,
        /// Values to exclude.
        exclusions: Vec<ValueSetValue>,
    },

    /// Language stem (language tag prefix match).
    LanguageStem(String),

    /// Language stem with exclusions.
    LanguageStemRange {
        /// Base stem to match, `None` for any language tagged literal.
        stem: Option<String>,
        /// Values to exclude.
        exclusions: Vec<ValueSetValue>,
    },
}

impl ValueSetValue {
    /// Creates an IRI stem value.
    pub fn iri_stem(stem: impl Into<String>) -> Self {
        Self::IriStem(stem.into())
    }

    /// Creates a literal stem value.
    pub fn literal_stem(stem: impl Into<String>) -> Self {
        Self::LiteralStem(stem.into())
    }

    /// Creates a language stem value.
    pub fn language_stem(stem: impl Into<String>) -> Self {
        Self::LanguageStem(stem.into())
    }
}

impl From<Term> for ValueSetValue {
    fn from(term: Term) -> Self {
        Self::ObjectValue(term)
    }
}

impl From<NamedNode> for ValueSetValue {
    fn from(node: NamedNode) -> Self {
        Self::ObjectValue(node.into())
    }
}

impl From<oxrdf::Literal> for ValueSetValue {
    fn from(literal: oxrdf::Literal) -> Self {
        Self::ObjectValue(literal.into())
    }
}

/// Semantic action: an extension hook identified by an IRI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticAction {
    /// Name of the extension.
    pub name: NamedNode,
    /// Code passed to the extension.
    pub code: Option<String>,
}

impl SemanticAction {
    /// Creates a semantic action.
    pub fn new(name: NamedNode, code: Option<String>) -> Self {
        Self { name, code }
    }
}

/// Annotation on shapes or triple expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Annotation predicate.
    pub predicate: NamedNode,
    /// Annotation value.
    pub object: Term,
}

impl Annotation {
    /// Creates a new annotation.
    pub fn new(predicate: NamedNode, object: Term) -> Self {
        Self { predicate, object }
    }
}
