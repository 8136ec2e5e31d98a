//! The recursive matching engine.
//!
//! A [`Matcher`] lives for exactly one top-level validation call. It owns the recursion stack of
//! pending `(node, shape label)` pairs, the search budget and the compiled regex cache, so nothing
//! leaks from one call to the next and the schema itself is never mutated.

use crate::error::ShexValidationError;
use crate::extension::{Extensions, SemanticActionContext};
use crate::graph::{Neighborhood, NeighborhoodArc, ShexGraph};
use crate::limits::{LimitTracker, ValidationLimitError, ValidationLimits};
use crate::model::{SemanticAction, Shape, ShapeExpression, ShapeLabel, TripleConstraint};
use crate::node_constraint::{RegexCache, check_node_constraint};
use crate::partition::{ArcGroup, CompiledTripleExpr, PartitionSearch};
use crate::result::{Evidence, TripleExprSolution, TripleMatch, ValidationResult, ViolationReason};
use crate::schema::ShapesSchema;
use oxrdf::{NamedNode, Term};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Remaining stack below which a nested shape reference moves to a fresh stack segment.
const STACK_RED_ZONE: usize = 128 * 1024;

/// Size of each stack segment allocated for deep shape reference chains.
const STACK_SEGMENT_SIZE: usize = 2 * 1024 * 1024;

pub(crate) struct Matcher<'a, G: ?Sized> {
    schema: &'a ShapesSchema,
    graph: &'a G,
    extensions: &'a Extensions,
    /// Shape references being evaluated, innermost last.
    stack: Vec<(Term, ShapeLabel)>,
    tracker: LimitTracker,
    regexes: RegexCache,
}

impl<'a, G: ShexGraph + ?Sized> Matcher<'a, G> {
    pub(crate) fn new(
        schema: &'a ShapesSchema,
        graph: &'a G,
        extensions: &'a Extensions,
        limits: ValidationLimits,
    ) -> Self {
        Self {
            schema,
            graph,
            extensions,
            stack: Vec::new(),
            tracker: LimitTracker::new(limits),
            regexes: RegexCache::default(),
        }
    }

    /// Validates `node` against the shape labeled `label`.
    pub(crate) fn validate_label(
        mut self,
        node: &Term,
        label: &ShapeLabel,
    ) -> Result<ValidationResult, ShexValidationError> {
        if let Some(failed) = self.run_start_actions(node, Some(label)) {
            return Ok(failed.labeled(label));
        }
        let result = self.match_label(node, label)?;
        Ok(self.finish(node, result).labeled(label))
    }

    /// Validates `node` against an expression that is not necessarily part of the schema.
    pub(crate) fn validate_expression(
        mut self,
        node: &Term,
        expression: &ShapeExpression,
    ) -> Result<ValidationResult, ShexValidationError> {
        if let Some(failed) = self.run_start_actions(node, None) {
            return Ok(failed);
        }
        let result = self.match_expression(node, expression)?;
        Ok(self.finish(node, result))
    }

    /// Once a limit is hit the outcome of the whole call is unknown.
    fn finish(&self, node: &Term, result: ValidationResult) -> ValidationResult {
        debug!(%node, combinations = self.tracker.combinations(), "validation finished");
        match self.tracker.exhausted() {
            Some(error) => {
                ValidationResult::violating(node.clone(), vec![limit_reason(node, error)])
            }
            None => result,
        }
    }

    fn run_start_actions(
        &self,
        node: &Term,
        label: Option<&ShapeLabel>,
    ) -> Option<ValidationResult> {
        let context = SemanticActionContext {
            focus: node,
            shape: label,
            triple: None,
        };
        let action = self
            .extensions
            .run_actions(self.schema.start_actions(), &context)?;
        Some(ValidationResult::violating(
            node.clone(),
            vec![ViolationReason::SemanticActionFailed { action }],
        ))
    }

    fn match_label(
        &mut self,
        node: &Term,
        label: &ShapeLabel,
    ) -> Result<ValidationResult, ShexValidationError> {
        let schema = self.schema;
        let expression = match schema.resolve(label) {
            Ok(expression) => expression,
            Err(error) => {
                return Ok(ValidationResult::violating(
                    node.clone(),
                    vec![ViolationReason::UnresolvedReference { label: error.label }],
                )
                .labeled(label));
            }
        };
        if self
            .stack
            .iter()
            .any(|(pending_node, pending_label)| pending_node == node && pending_label == label)
        {
            trace!(%node, shape = %label, "assuming conformance of pending shape reference");
            return Ok(
                ValidationResult::conforming(node.clone(), Evidence::RecursionAssumed)
                    .labeled(label),
            );
        }
        if let Err(error) = self.tracker.check_depth(self.stack.len() + 1) {
            return Ok(
                ValidationResult::violating(node.clone(), vec![limit_reason(node, &error)])
                    .labeled(label),
            );
        }
        debug!(%node, shape = %label, depth = self.stack.len(), "validating shape reference");
        self.stack.push((node.clone(), label.clone()));
        // Recursion depth is bounded by the limits, not by the caller's thread stack.
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT_SIZE, || {
            self.match_expression(node, expression)
        });
        self.stack.pop();
        Ok(result?.labeled(label))
    }

    fn match_expression(
        &mut self,
        node: &Term,
        expression: &ShapeExpression,
    ) -> Result<ValidationResult, ShexValidationError> {
        if let Some(error) = self.tracker.exhausted() {
            return Ok(ValidationResult::violating(
                node.clone(),
                vec![limit_reason(node, error)],
            ));
        }
        match expression {
            ShapeExpression::ShapeAnd(conjuncts) => {
                let mut results = Vec::with_capacity(conjuncts.len());
                for conjunct in conjuncts {
                    let result = self.match_expression(node, conjunct)?;
                    if !result.conforms() {
                        return Ok(ValidationResult::violating(
                            node.clone(),
                            result.into_reasons(),
                        ));
                    }
                    results.push(result);
                }
                Ok(ValidationResult::conforming(
                    node.clone(),
                    Evidence::And { results },
                ))
            }
            ShapeExpression::ShapeOr(disjuncts) => {
                let mut reasons = Vec::new();
                for (index, disjunct) in disjuncts.iter().enumerate() {
                    let result = self.match_expression(node, disjunct)?;
                    if result.conforms() {
                        return Ok(ValidationResult::conforming(
                            node.clone(),
                            Evidence::Or {
                                index,
                                result: Box::new(result),
                            },
                        ));
                    }
                    reasons.extend(result.into_reasons());
                }
                Ok(ValidationResult::violating(node.clone(), reasons))
            }
            ShapeExpression::ShapeNot(negated) => {
                let result = self.match_expression(node, negated)?;
                if let Some(error) = self.tracker.exhausted() {
                    return Ok(ValidationResult::violating(
                        node.clone(),
                        vec![limit_reason(node, error)],
                    ));
                }
                Ok(if result.conforms() {
                    ValidationResult::violating(
                        node.clone(),
                        vec![ViolationReason::NegationViolated],
                    )
                } else {
                    ValidationResult::conforming(node.clone(), Evidence::Not)
                })
            }
            ShapeExpression::NodeConstraint(constraint) => {
                let failures =
                    check_node_constraint(node, constraint, &mut self.regexes, &self.tracker);
                Ok(if failures.is_empty() {
                    ValidationResult::conforming(node.clone(), Evidence::NodeConstraint)
                } else {
                    ValidationResult::violating(node.clone(), failures)
                })
            }
            ShapeExpression::Shape(shape) => self.match_shape(node, shape),
            ShapeExpression::ShapeExternal => self.match_external(node),
            ShapeExpression::ShapeRef(label) => self.match_label(node, label),
        }
    }

    fn match_external(&self, node: &Term) -> Result<ValidationResult, ShexValidationError> {
        let Some(resolver) = self.extensions.external() else {
            return Ok(ValidationResult::violating(
                node.clone(),
                vec![ViolationReason::ExternalShapeFailed {
                    message: "no external shape resolver is configured".into(),
                }],
            ));
        };
        let conforms = resolver
            .resolve(node, self.current_label())
            .map_err(|e| ShexValidationError::external(node, e))?;
        Ok(if conforms {
            ValidationResult::conforming(node.clone(), Evidence::External)
        } else {
            ValidationResult::violating(
                node.clone(),
                vec![ViolationReason::ExternalShapeFailed {
                    message: "rejected by the external shape resolver".into(),
                }],
            )
        })
    }

    fn current_label(&self) -> Option<&ShapeLabel> {
        self.stack.last().map(|(_, label)| label)
    }

    fn match_shape(
        &mut self,
        node: &Term,
        shape: &Shape,
    ) -> Result<ValidationResult, ShexValidationError> {
        let compiled = match &shape.expression {
            Some(expression) => match CompiledTripleExpr::compile(expression, self.schema) {
                Ok(compiled) => Some(compiled),
                Err(reason) => {
                    return Ok(ValidationResult::violating(node.clone(), vec![reason]));
                }
            },
            None => None,
        };
        let leaves: Vec<&TripleConstraint> = compiled
            .as_ref()
            .map(|compiled| compiled.leaves().collect())
            .unwrap_or_default();
        let with_incoming = compiled.as_ref().is_some_and(CompiledTripleExpr::has_inverse);
        let neighborhood = Neighborhood::load(self.graph, node, with_incoming)
            .map_err(|e| ShexValidationError::graph(node, e))?;
        let arcs = neighborhood.arcs();

        let mut reasons = Vec::new();
        let mut groups: Vec<ArcGroup> = Vec::new();
        let mut unmatched = Vec::new();
        let mut value_results = FxHashMap::default();
        for (arc_index, arc) in arcs.iter().enumerate() {
            let in_extra = shape.extra.contains(arc.predicate());
            let candidates = leaves.iter().enumerate().filter(|(_, leaf)| {
                leaf.predicate == *arc.predicate() && leaf.inverse == arc.inverse
            });
            let mut has_candidate = false;
            let mut conforming = Vec::new();
            let mut causes = Vec::new();
            let value = arc.value();
            for (leaf_index, leaf) in candidates {
                has_candidate = true;
                let Some(value_expr) = &leaf.value_expr else {
                    conforming.push(Some(leaf_index));
                    value_results.insert((arc_index, leaf_index), None);
                    continue;
                };
                let result = self.match_expression(&value, value_expr)?;
                if let Some(error) = self.tracker.exhausted() {
                    return Ok(ValidationResult::violating(
                        node.clone(),
                        vec![limit_reason(node, error)],
                    ));
                }
                if result.conforms() {
                    conforming.push(Some(leaf_index));
                    value_results.insert((arc_index, leaf_index), Some(Box::new(result)));
                } else {
                    causes.extend(result.into_reasons());
                }
            }
            if !has_candidate {
                if shape.closed && !arc.inverse && !in_extra {
                    reasons.push(ViolationReason::UnexpectedPredicate {
                        triple: arc.triple.clone(),
                    });
                } else {
                    unmatched.push(arc_index);
                }
            } else if conforming.is_empty() {
                if in_extra {
                    unmatched.push(arc_index);
                } else {
                    reasons.push(ViolationReason::ValueMismatch {
                        value,
                        message: format!(
                            "does not conform to any constraint on {}{}",
                            if arc.inverse { "^" } else { "" },
                            arc.predicate()
                        ),
                        triple: Some(arc.triple.clone()),
                        causes,
                    });
                }
            } else {
                if in_extra {
                    conforming.push(None);
                }
                match groups.iter_mut().find(|group| group.slots == conforming) {
                    Some(group) => group.arcs.push(arc_index),
                    None => groups.push(ArcGroup {
                        arcs: vec![arc_index],
                        slots: conforming,
                    }),
                }
            }
        }
        if !reasons.is_empty() {
            return Ok(ValidationResult::violating(node.clone(), reasons));
        }

        let Some(compiled) = compiled else {
            return Ok(self.shape_conforms(node, shape, None, unmatched, arcs));
        };
        let leaf_count = compiled.leaf_count();
        let mut search = PartitionSearch::new(groups);
        let mut first_counts = None;
        // Leaves out of range in every distribution tried so far.
        let mut always_out_of_range: Option<Vec<bool>> = None;
        let mut failed_action = None;
        loop {
            match search.advance(&mut self.tracker) {
                Ok(true) => {}
                Ok(false) => break,
                Err(error) => {
                    return Ok(ValidationResult::violating(
                        node.clone(),
                        vec![limit_reason(node, &error)],
                    ));
                }
            }
            let counts = search.counts(leaf_count);
            trace!(%node, ?counts, "trying partition");
            let out_of_range = compiled.out_of_range(&counts);
            match &mut always_out_of_range {
                Some(flags) => {
                    for (flag, out) in flags.iter_mut().zip(out_of_range) {
                        *flag &= out;
                    }
                }
                None => always_out_of_range = Some(out_of_range),
            }
            if !compiled.is_satisfied_by(&counts) {
                first_counts.get_or_insert(counts);
                continue;
            }
            let (by_leaf, mut left) = search.assignment(leaf_count);
            if let Some(action) = self.run_triple_actions(node, &leaves, &by_leaf, &neighborhood) {
                failed_action = Some(action);
                continue;
            }
            let context = SemanticActionContext {
                focus: node,
                shape: self.current_label(),
                triple: None,
            };
            for group in compiled.groups() {
                if let Some(action) = self.extensions.run_actions(&group.sem_acts, &context) {
                    return Ok(action_failed(node, action));
                }
            }
            let matches = by_leaf
                .into_iter()
                .enumerate()
                .map(|(leaf_index, arc_indices)| {
                    arc_indices
                        .into_iter()
                        .map(|arc_index| TripleMatch {
                            triple: arcs[arc_index].triple.clone(),
                            result: value_results.remove(&(arc_index, leaf_index)).flatten(),
                        })
                        .collect()
                })
                .collect();
            left.extend(unmatched);
            left.sort_unstable();
            return Ok(self.shape_conforms(
                node,
                shape,
                Some(compiled.solution(matches)),
                left,
                arcs,
            ));
        }

        if let Some(action) = failed_action {
            return Ok(action_failed(node, action));
        }
        let combinations = search.combinations();
        let mut reasons = match (&first_counts, &always_out_of_range) {
            (Some(counts), Some(flags)) => compiled.cardinality_violations(counts, flags),
            _ => Vec::new(),
        };
        if reasons.is_empty() {
            reasons.push(ViolationReason::NoSatisfyingPartition { combinations });
        }
        Ok(ValidationResult::violating(node.clone(), reasons))
    }

    /// Runs the semantic actions of each triple constraint once per triple it matched.
    fn run_triple_actions(
        &self,
        node: &Term,
        leaves: &[&TripleConstraint],
        by_leaf: &[Vec<usize>],
        neighborhood: &Neighborhood,
    ) -> Option<NamedNode> {
        for (leaf, arc_indices) in leaves.iter().zip(by_leaf) {
            if leaf.sem_acts.is_empty() {
                continue;
            }
            for arc_index in arc_indices {
                let context = SemanticActionContext {
                    focus: node,
                    shape: self.current_label(),
                    triple: Some(&neighborhood.arcs()[*arc_index].triple),
                };
                if let Some(action) = self.extensions.run_actions(&leaf.sem_acts, &context) {
                    return Some(action);
                }
            }
        }
        None
    }

    fn shape_conforms(
        &self,
        node: &Term,
        shape: &Shape,
        solution: Option<TripleExprSolution>,
        unmatched: Vec<usize>,
        arcs: &[NeighborhoodArc],
    ) -> ValidationResult {
        if let Some(action) = self.run_shape_actions(node, &shape.sem_acts) {
            return action_failed(node, action);
        }
        ValidationResult::conforming(
            node.clone(),
            Evidence::Shape {
                solution,
                unmatched: unmatched
                    .into_iter()
                    .map(|arc_index| arcs[arc_index].triple.clone())
                    .collect(),
            },
        )
    }

    fn run_shape_actions(&self, node: &Term, actions: &[SemanticAction]) -> Option<NamedNode> {
        let context = SemanticActionContext {
            focus: node,
            shape: self.current_label(),
            triple: None,
        };
        self.extensions.run_actions(actions, &context)
    }
}

fn action_failed(node: &Term, action: NamedNode) -> ValidationResult {
    ValidationResult::violating(
        node.clone(),
        vec![ViolationReason::SemanticActionFailed { action }],
    )
}

fn limit_reason(node: &Term, error: &ValidationLimitError) -> ViolationReason {
    match error {
        ValidationLimitError::MaxRecursionDepthExceeded { depth, limit } => {
            ViolationReason::RecursionDepthExceeded {
                depth: *depth,
                limit: *limit,
            }
        }
        ValidationLimitError::SearchBudgetExceeded { budget } => {
            ViolationReason::SearchBudgetExceeded { budget: *budget }
        }
        ValidationLimitError::RegexTooLong { .. } => {
            ViolationReason::value_mismatch(node, error.to_string())
        }
    }
}
