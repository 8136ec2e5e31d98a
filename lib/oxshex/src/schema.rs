//! Shapes schema: the immutable mapping from shape labels to shape expressions.
//!
//! A [`ShapesSchema`] is assembled once through a [`ShapesSchemaBuilder`] (the boundary with
//! whatever parser produced the abstract syntax) and is then only read. It can be shared between
//! threads and used by any number of concurrent validations.

use crate::error::{ShexParseError, UnresolvedReferenceError};
use crate::model::{
    NodeConstraint, SemanticAction, ShapeExpression, ShapeLabel, StringFacet, TripleExprLabel,
    TripleExpression,
};
use oxrdf::{BlankNode, NamedNode};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Collection of shapes (shapes schema in ShEx terminology).
///
/// Contains shape definitions indexed by label, the labeled triple expressions, an optional start
/// shape and the start semantic actions.
#[derive(Debug, Clone, Default)]
pub struct ShapesSchema {
    /// Shape expressions indexed by label.
    shapes: FxHashMap<ShapeLabel, ShapeExpression>,

    /// All shape labels, in declaration order.
    labels: Vec<ShapeLabel>,

    /// Labeled triple expressions.
    triple_exprs: FxHashMap<TripleExprLabel, TripleExpression>,

    /// Optional start shape (default entry point for validation).
    start: Option<ShapeLabel>,

    /// Semantic actions run at the start of each validation.
    start_acts: Vec<SemanticAction>,

    /// Imported schemas.
    imports: Vec<NamedNode>,
}

impl ShapesSchema {
    /// Creates a new empty shapes schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    pub fn builder() -> ShapesSchemaBuilder {
        ShapesSchemaBuilder::new()
    }

    /// Resolves a shape label to its shape expression.
    pub fn resolve(
        &self,
        label: &ShapeLabel,
    ) -> Result<&ShapeExpression, UnresolvedReferenceError> {
        self.shapes
            .get(label)
            .ok_or_else(|| UnresolvedReferenceError::new(label))
    }

    /// Resolves a triple expression label.
    pub fn resolve_triple_expression(
        &self,
        label: &TripleExprLabel,
    ) -> Result<&TripleExpression, UnresolvedReferenceError> {
        self.triple_exprs
            .get(label)
            .ok_or_else(|| UnresolvedReferenceError::new(label))
    }

    /// Gets a shape expression by label.
    pub fn get_shape(&self, label: &ShapeLabel) -> Option<&ShapeExpression> {
        self.shapes.get(label)
    }

    /// Returns an iterator over all shape labels, in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = &ShapeLabel> {
        self.labels.iter()
    }

    /// Returns an iterator over all shapes, in declaration order.
    pub fn shapes(&self) -> impl Iterator<Item = (&ShapeLabel, &ShapeExpression)> {
        self.labels
            .iter()
            .filter_map(|label| Some((label, self.shapes.get(label)?)))
    }

    /// Gets the start shape label.
    pub fn start(&self) -> Option<&ShapeLabel> {
        self.start.as_ref()
    }

    /// Semantic actions run when a validation starts.
    pub fn start_actions(&self) -> &[SemanticAction] {
        &self.start_acts
    }

    /// Returns an iterator over imports.
    pub fn imports(&self) -> impl Iterator<Item = &NamedNode> {
        self.imports.iter()
    }

    /// Returns true if the schema is empty.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Returns the number of shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Validates that all shape and triple expression references are defined.
    ///
    /// Schemas do not have to pass this check to be used: an unresolved reference met during
    /// validation is reported in the validation result.
    pub fn validate_refs(&self) -> Result<(), ShexParseError> {
        if let Some(start) = &self.start {
            if !self.shapes.contains_key(start) {
                return Err(ShexParseError::undefined_shape_ref(start));
            }
        }
        for (_, expr) in self.shapes() {
            for ref_label in expr.collect_refs() {
                if !self.shapes.contains_key(ref_label) {
                    return Err(ShexParseError::undefined_shape_ref(ref_label));
                }
            }
            self.check_nested_triple_exprs(expr)?;
        }
        let mut missing = None;
        for expression in self.triple_exprs.values() {
            expression.walk(&mut |nested| {
                if let TripleExpression::TripleConstraint(tc) = nested {
                    if let Some(value_expr) = &tc.value_expr {
                        for ref_label in value_expr.collect_refs() {
                            if missing.is_none() && !self.shapes.contains_key(ref_label) {
                                missing = Some(ref_label.clone());
                            }
                        }
                    }
                }
            });
        }
        match missing {
            Some(label) => Err(ShexParseError::undefined_shape_ref(label)),
            None => Ok(()),
        }
    }

    /// Checks that no shape depends on itself through a negation.
    ///
    /// Such schemas have no well defined semantics: the recursion guard assumes conformance of
    /// pending references, which a negation would turn into a violation of the same pair.
    pub fn check_negation_stratification(&self) -> Result<(), ShexParseError> {
        // Edges label -> (referenced label, negated)
        let mut edges: FxHashMap<&ShapeLabel, Vec<(&ShapeLabel, bool)>> = FxHashMap::default();
        for (label, expr) in self.shapes() {
            let mut targets = Vec::new();
            self.visit_shape_refs(expr, false, &mut FxHashSet::default(), &mut |target, negated| {
                targets.push((target, negated));
            });
            edges.insert(label, targets);
        }
        for (label, targets) in &edges {
            for (target, negated) in targets {
                if *negated && reaches(&edges, target, label) {
                    return Err(ShexParseError::negated_self_reference(label));
                }
            }
        }
        Ok(())
    }

    fn check_triple_expr_refs<'a>(
        &'a self,
        expression: &'a TripleExpression,
        visiting: &mut Vec<&'a TripleExprLabel>,
    ) -> Result<(), ShexParseError> {
        match expression {
            TripleExpression::TripleExprRef(label) => {
                if visiting.contains(&label) {
                    return Err(ShexParseError::cyclic_triple_expr_ref(label));
                }
                let target = self
                    .triple_exprs
                    .get(label)
                    .ok_or_else(|| ShexParseError::undefined_triple_expr_ref(label))?;
                visiting.push(label);
                self.check_triple_expr_refs(target, visiting)?;
                visiting.pop();
            }
            TripleExpression::EachOf(group) | TripleExpression::OneOf(group) => {
                if let Some(id) = &group.id {
                    if visiting.contains(&id) {
                        return Err(ShexParseError::cyclic_triple_expr_ref(id));
                    }
                    visiting.push(id);
                }
                for nested in &group.expressions {
                    self.check_triple_expr_refs(nested, visiting)?;
                }
                if group.id.is_some() {
                    visiting.pop();
                }
            }
            TripleExpression::TripleConstraint(_) => {}
        }
        Ok(())
    }

    /// Shapes nested in value expressions may carry their own triple expression references.
    fn check_nested_triple_exprs(&self, expr: &ShapeExpression) -> Result<(), ShexParseError> {
        match expr {
            ShapeExpression::ShapeAnd(shapes) | ShapeExpression::ShapeOr(shapes) => {
                for shape in shapes {
                    self.check_nested_triple_exprs(shape)?;
                }
            }
            ShapeExpression::ShapeNot(shape) => self.check_nested_triple_exprs(shape)?,
            ShapeExpression::Shape(shape) => {
                if let Some(expression) = &shape.expression {
                    self.check_triple_expr_refs(expression, &mut Vec::new())?;
                    let mut nested = Vec::new();
                    expression.walk(&mut |e| {
                        if let TripleExpression::TripleConstraint(tc) = e {
                            if let Some(value_expr) = &tc.value_expr {
                                nested.push(&**value_expr);
                            }
                        }
                    });
                    for value_expr in nested {
                        self.check_nested_triple_exprs(value_expr)?;
                    }
                }
            }
            ShapeExpression::NodeConstraint(_)
            | ShapeExpression::ShapeExternal
            | ShapeExpression::ShapeRef(_) => {}
        }
        Ok(())
    }

    /// Calls `visitor` on the shape references of `expr` with whether they are under a negation.
    ///
    /// Triple expression references are followed, shape references are not.
    fn visit_shape_refs<'a>(
        &'a self,
        expr: &'a ShapeExpression,
        negated: bool,
        seen: &mut FxHashSet<(&'a TripleExprLabel, bool)>,
        visitor: &mut impl FnMut(&'a ShapeLabel, bool),
    ) {
        match expr {
            ShapeExpression::ShapeAnd(shapes) | ShapeExpression::ShapeOr(shapes) => {
                for shape in shapes {
                    self.visit_shape_refs(shape, negated, seen, &mut *visitor);
                }
            }
            ShapeExpression::ShapeNot(shape) => {
                self.visit_shape_refs(shape, true, seen, &mut *visitor);
            }
            ShapeExpression::ShapeRef(label) => visitor(label, negated),
            ShapeExpression::Shape(shape) => {
                if let Some(expression) = &shape.expression {
                    self.visit_triple_expr_shape_refs(expression, negated, seen, &mut *visitor);
                }
            }
            ShapeExpression::NodeConstraint(_) | ShapeExpression::ShapeExternal => {}
        }
    }

    fn visit_triple_expr_shape_refs<'a>(
        &'a self,
        expression: &'a TripleExpression,
        negated: bool,
        seen: &mut FxHashSet<(&'a TripleExprLabel, bool)>,
        visitor: &mut impl FnMut(&'a ShapeLabel, bool),
    ) {
        match expression {
            TripleExpression::TripleExprRef(label) => {
                if !seen.insert((label, negated)) {
                    return;
                }
                if let Some(target) = self.triple_exprs.get(label) {
                    self.visit_triple_expr_shape_refs(target, negated, seen, &mut *visitor);
                }
            }
            TripleExpression::EachOf(group) | TripleExpression::OneOf(group) => {
                for nested in &group.expressions {
                    self.visit_triple_expr_shape_refs(nested, negated, seen, &mut *visitor);
                }
            }
            TripleExpression::TripleConstraint(tc) => {
                if let Some(value_expr) = &tc.value_expr {
                    self.visit_shape_refs(value_expr, negated, seen, &mut *visitor);
                }
            }
        }
    }
}

fn reaches<'a>(
    edges: &FxHashMap<&'a ShapeLabel, Vec<(&'a ShapeLabel, bool)>>,
    from: &'a ShapeLabel,
    to: &ShapeLabel,
) -> bool {
    let mut stack = vec![from];
    let mut seen = FxHashSet::default();
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(targets) = edges.get(current) {
            stack.extend(targets.iter().map(|(target, _)| *target));
        }
    }
    false
}

/// Deterministic blank node generator.
///
/// Produces `b0`, `b1`, ... Parsers use it to label anonymous shapes and triple expressions so
/// that the same schema text always yields the same labels, provided the counter is reset between
/// independent runs.
#[derive(Debug, Clone, Default)]
pub struct BlankNodeCounter {
    next: u64,
}

impl BlankNodeCounter {
    /// Creates a counter starting at `b0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh blank node.
    pub fn fresh(&mut self) -> BlankNode {
        let id = self.next;
        self.next += 1;
        BlankNode::new_unchecked(format!("b{id}"))
    }

    /// Restarts the numbering at `b0`.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Builder for [`ShapesSchema`].
///
/// The builder survives [`build`](Self::build) so that a parser can keep it (with its blank node
/// counter) across several schemas; [`reset_blank_nodes`](Self::reset_blank_nodes) restarts the
/// numbering.
///
/// ```
/// use oxrdf::NamedNode;
/// use oxshex::{NodeConstraint, NodeKind, ShapeLabel, ShapesSchemaBuilder};
///
/// let label = ShapeLabel::from(NamedNode::new("http://example.org/S")?);
/// let mut builder = ShapesSchemaBuilder::new();
/// builder.add_shape(label.clone(), NodeConstraint::with_node_kind(NodeKind::Iri))?;
/// builder.set_start(label.clone());
/// let schema = builder.build();
/// assert_eq!(schema.start(), Some(&label));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Default)]
pub struct ShapesSchemaBuilder {
    schema: ShapesSchema,
    blank_nodes: BlankNodeCounter,
}

impl ShapesSchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shape expression with the given label.
    ///
    /// Labeled triple expressions found inside the shape are indexed for references.
    pub fn add_shape(
        &mut self,
        label: ShapeLabel,
        expr: impl Into<ShapeExpression>,
    ) -> Result<&mut Self, ShexParseError> {
        if self.schema.shapes.contains_key(&label) {
            return Err(ShexParseError::duplicate_shape_label(&label));
        }
        let expr = expr.into();
        self.index_triple_exprs(&expr)?;
        self.schema.labels.push(label.clone());
        self.schema.shapes.insert(label, expr);
        Ok(self)
    }

    /// Adds a labeled triple expression.
    pub fn add_triple_expression(
        &mut self,
        label: TripleExprLabel,
        expression: TripleExpression,
    ) -> Result<&mut Self, ShexParseError> {
        if self.schema.triple_exprs.contains_key(&label) {
            return Err(ShexParseError::duplicate_triple_expr_label(&label));
        }
        self.index_nested_triple_exprs(&expression)?;
        self.schema.triple_exprs.insert(label, expression);
        Ok(self)
    }

    /// Sets the start shape.
    pub fn set_start(&mut self, label: ShapeLabel) -> &mut Self {
        self.schema.start = Some(label);
        self
    }

    /// Adds a start semantic action.
    pub fn add_start_action(&mut self, action: SemanticAction) -> &mut Self {
        self.schema.start_acts.push(action);
        self
    }

    /// Adds an import.
    pub fn add_import(&mut self, import: NamedNode) -> &mut Self {
        self.schema.imports.push(import);
        self
    }

    /// Mints a fresh blank node label (`_:b0`, `_:b1`...).
    pub fn fresh_label(&mut self) -> ShapeLabel {
        ShapeLabel::BNode(self.blank_nodes.fresh())
    }

    /// Restarts blank node numbering.
    pub fn reset_blank_nodes(&mut self) -> &mut Self {
        self.blank_nodes.reset();
        self
    }

    /// Returns the schema built so far and leaves the builder empty.
    ///
    /// References are not checked: unresolved ones are reported when validation meets them.
    pub fn build(&mut self) -> ShapesSchema {
        std::mem::take(&mut self.schema)
    }

    /// Like [`build`](Self::build), but checks references, regular expressions and negation
    /// stratification first.
    ///
    /// The builder keeps its content when a check fails.
    pub fn build_checked(&mut self) -> Result<ShapesSchema, ShexParseError> {
        let schema = &self.schema;
        schema.validate_refs()?;
        schema.check_negation_stratification()?;
        for (_, expr) in schema.shapes() {
            check_patterns(expr)?;
        }
        for expression in schema.triple_exprs.values() {
            let mut result = Ok(());
            expression.walk(&mut |nested| {
                if let TripleExpression::TripleConstraint(tc) = nested {
                    if let Some(value_expr) = &tc.value_expr {
                        if result.is_ok() {
                            result = check_patterns(value_expr);
                        }
                    }
                }
            });
            result?;
        }
        Ok(self.build())
    }

    fn index_triple_exprs(&mut self, expr: &ShapeExpression) -> Result<(), ShexParseError> {
        match expr {
            ShapeExpression::ShapeAnd(shapes) | ShapeExpression::ShapeOr(shapes) => {
                for shape in shapes {
                    self.index_triple_exprs(shape)?;
                }
            }
            ShapeExpression::ShapeNot(shape) => self.index_triple_exprs(shape)?,
            ShapeExpression::Shape(shape) => {
                if let Some(expression) = &shape.expression {
                    self.index_nested_triple_exprs(expression)?;
                }
            }
            ShapeExpression::NodeConstraint(_)
            | ShapeExpression::ShapeExternal
            | ShapeExpression::ShapeRef(_) => {}
        }
        Ok(())
    }

    fn index_nested_triple_exprs(
        &mut self,
        expression: &TripleExpression,
    ) -> Result<(), ShexParseError> {
        let mut labeled = Vec::new();
        let mut value_exprs = Vec::new();
        expression.walk(&mut |nested| {
            if let Some(id) = nested.id() {
                labeled.push((id.clone(), nested.clone()));
            }
            if let TripleExpression::TripleConstraint(tc) = nested {
                if let Some(value_expr) = &tc.value_expr {
                    value_exprs.push(&**value_expr);
                }
            }
        });
        for (id, nested) in labeled {
            match self.schema.triple_exprs.get(&id) {
                Some(existing) if *existing != nested => {
                    return Err(ShexParseError::duplicate_triple_expr_label(&id));
                }
                Some(_) => {}
                None => {
                    self.schema.triple_exprs.insert(id, nested);
                }
            }
        }
        for value_expr in value_exprs {
            self.index_triple_exprs(value_expr)?;
        }
        Ok(())
    }
}

fn check_patterns(expr: &ShapeExpression) -> Result<(), ShexParseError> {
    match expr {
        ShapeExpression::ShapeAnd(shapes) | ShapeExpression::ShapeOr(shapes) => {
            shapes.iter().try_for_each(check_patterns)
        }
        ShapeExpression::ShapeNot(shape) => check_patterns(shape),
        ShapeExpression::NodeConstraint(constraint) => check_node_constraint_patterns(constraint),
        ShapeExpression::Shape(shape) => {
            let mut result = Ok(());
            if let Some(expression) = &shape.expression {
                expression.walk(&mut |nested| {
                    if let TripleExpression::TripleConstraint(tc) = nested {
                        if let Some(value_expr) = &tc.value_expr {
                            if result.is_ok() {
                                result = check_patterns(value_expr);
                            }
                        }
                    }
                });
            }
            result
        }
        ShapeExpression::ShapeExternal | ShapeExpression::ShapeRef(_) => Ok(()),
    }
}

fn check_node_constraint_patterns(constraint: &NodeConstraint) -> Result<(), ShexParseError> {
    for facet in &constraint.string_facets {
        if let StringFacet::Pattern { pattern, flags } = facet {
            Regex::new(&crate::node_constraint::regex_source(pattern, flags.as_deref()))
                .map_err(|e| ShexParseError::invalid_regex(pattern.as_str(), e))?;
        }
    }
    Ok(())
}
