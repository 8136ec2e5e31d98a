//! Partition of a neighborhood over the triple constraints of a triple expression.
//!
//! A triple expression is compiled into a tree whose leaves are its triple constraints, in
//! declaration order, with labeled sub-expressions inlined. The arcs of the neighborhood that must
//! be matched are grouped by the set of leaves they conform to: arcs of the same group are
//! interchangeable, so the search only enumerates how many arcs of each group go to each of its
//! leaves.
//!
//! Each candidate distribution is then decided by counting. For every node of the tree, the set of
//! repetition counts under which the node can consume exactly the arcs assigned to its leaves is an
//! interval:
//! - a leaf with cardinality `[min, max]` and `n` arcs accepts `J` repetitions iff
//!   `J * min <= n <= J * max`,
//! - an `EachOf` body accepts the intersection of the intervals of its children,
//! - a `OneOf` body accepts the sum of the intervals of its children,
//! - a group with cardinality `[a, b]` accepts `J` iff some `J'` in `[J * a, J * b]` is accepted by
//!   its body.
//!
//! The expression is satisfied iff its root accepts one repetition.

use crate::limits::{LimitTracker, ValidationLimitError};
use crate::model::{Cardinality, ShapeLabel, TripleConstraint, TripleExprGroup, TripleExpression};
use crate::result::{TripleExprSolution, TripleMatch, ViolationReason};
use crate::schema::ShapesSchema;

/// A triple expression with references resolved, ready for counting.
#[derive(Debug)]
pub(crate) struct CompiledTripleExpr<'a> {
    nodes: Vec<ExprNode<'a>>,
    leaves: Vec<Leaf<'a>>,
    root: usize,
}

#[derive(Debug)]
enum ExprNode<'a> {
    Leaf(usize),
    EachOf {
        group: &'a TripleExprGroup,
        children: Vec<usize>,
    },
    OneOf {
        group: &'a TripleExprGroup,
        children: Vec<usize>,
    },
}

#[derive(Debug)]
struct Leaf<'a> {
    constraint: &'a TripleConstraint,
    /// Cardinality of the leaf multiplied along its path, used for diagnostics only.
    effective_min: u64,
    effective_max: Option<u64>,
}

impl<'a> CompiledTripleExpr<'a> {
    /// Compiles `expression`, inlining triple expression references through `schema`.
    pub(crate) fn compile(
        expression: &'a TripleExpression,
        schema: &'a ShapesSchema,
    ) -> Result<Self, ViolationReason> {
        let mut compiled = Self {
            nodes: Vec::new(),
            leaves: Vec::new(),
            root: 0,
        };
        compiled.root = compiled.add(expression, schema, &mut Vec::new(), (1, Some(1)))?;
        Ok(compiled)
    }

    fn add(
        &mut self,
        expression: &'a TripleExpression,
        schema: &'a ShapesSchema,
        including: &mut Vec<&'a ShapeLabel>,
        (min, max): (u64, Option<u64>),
    ) -> Result<usize, ViolationReason> {
        let node = match expression {
            TripleExpression::TripleConstraint(constraint) => {
                self.leaves.push(Leaf {
                    constraint,
                    effective_min: min.saturating_mul(constraint.cardinality.min.into()),
                    effective_max: multiply(max, constraint.cardinality),
                });
                ExprNode::Leaf(self.leaves.len() - 1)
            }
            TripleExpression::EachOf(group) => {
                let bounds = (
                    min.saturating_mul(group.cardinality.min.into()),
                    multiply(max, group.cardinality),
                );
                let children = group
                    .expressions
                    .iter()
                    .map(|child| self.add(child, schema, including, bounds))
                    .collect::<Result<_, _>>()?;
                ExprNode::EachOf { group, children }
            }
            TripleExpression::OneOf(group) => {
                // Each alternative may be skipped by every repetition
                let bounds = (0, multiply(max, group.cardinality));
                let children = group
                    .expressions
                    .iter()
                    .map(|child| self.add(child, schema, including, bounds))
                    .collect::<Result<_, _>>()?;
                ExprNode::OneOf { group, children }
            }
            TripleExpression::TripleExprRef(label) => {
                if including.contains(&label) {
                    return Err(ViolationReason::UnresolvedReference {
                        label: label.to_string(),
                    });
                }
                let target = schema.resolve_triple_expression(label).map_err(|e| {
                    ViolationReason::UnresolvedReference { label: e.label }
                })?;
                including.push(label);
                let node = self.add(target, schema, including, (min, max))?;
                including.pop();
                return Ok(node);
            }
        };
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    /// The triple constraints, in declaration order.
    pub(crate) fn leaves(&self) -> impl Iterator<Item = &'a TripleConstraint> + '_ {
        self.leaves.iter().map(|leaf| leaf.constraint)
    }

    pub(crate) fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Returns true if some triple constraint is inverse.
    pub(crate) fn has_inverse(&self) -> bool {
        self.leaves.iter().any(|leaf| leaf.constraint.inverse)
    }

    /// The groups of the expression, in declaration order.
    pub(crate) fn groups(&self) -> impl Iterator<Item = &'a TripleExprGroup> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            ExprNode::EachOf { group, .. } | ExprNode::OneOf { group, .. } => Some(*group),
            ExprNode::Leaf(_) => None,
        })
    }

    /// Decides if assigning `counts[i]` arcs to the leaf `i` satisfies the expression.
    pub(crate) fn is_satisfied_by(&self, counts: &[usize]) -> bool {
        self.repetitions(self.root, counts)
            .is_some_and(|repetitions| repetitions.contains(1))
    }

    fn repetitions(&self, node: usize, counts: &[usize]) -> Option<Repetitions> {
        match &self.nodes[node] {
            ExprNode::Leaf(leaf) => Repetitions::of_leaf(
                counts[*leaf] as u64,
                self.leaves[*leaf].constraint.cardinality,
            ),
            ExprNode::EachOf { group, children } => {
                let mut body = Repetitions::ANY;
                for child in children {
                    body = body.intersection(self.repetitions(*child, counts)?)?;
                }
                body.of_group(group.cardinality)
            }
            ExprNode::OneOf { group, children } => {
                let mut body = Repetitions::NONE;
                for child in children {
                    body = body.sum(self.repetitions(*child, counts)?);
                }
                body.of_group(group.cardinality)
            }
        }
    }

    /// Flags the leaves whose count no repetition of their enclosing groups can explain.
    pub(crate) fn out_of_range(&self, counts: &[usize]) -> Vec<bool> {
        self.leaves
            .iter()
            .zip(counts)
            .map(|(leaf, count)| {
                let count = *count as u64;
                count < leaf.effective_min || leaf.effective_max.is_some_and(|max| count > max)
            })
            .collect()
    }

    /// Cardinality violations of the leaves flagged in `flagged`, reported with their count in
    /// `counts`.
    pub(crate) fn cardinality_violations(
        &self,
        counts: &[usize],
        flagged: &[bool],
    ) -> Vec<ViolationReason> {
        self.leaves
            .iter()
            .zip(counts)
            .zip(flagged)
            .filter(|(_, flagged)| **flagged)
            .map(|((leaf, count), _)| ViolationReason::CardinalityViolation {
                predicate: leaf.constraint.predicate.clone(),
                inverse: leaf.constraint.inverse,
                count: *count,
                cardinality: leaf.constraint.cardinality,
            })
            .collect()
    }

    /// Builds the solution tree from the matches of each leaf.
    pub(crate) fn solution(&self, mut matches: Vec<Vec<TripleMatch>>) -> TripleExprSolution {
        self.node_solution(self.root, &mut matches)
    }

    fn node_solution(&self, node: usize, matches: &mut [Vec<TripleMatch>]) -> TripleExprSolution {
        match &self.nodes[node] {
            ExprNode::Leaf(leaf) => {
                let constraint = self.leaves[*leaf].constraint;
                TripleExprSolution::TripleConstraint {
                    predicate: constraint.predicate.clone(),
                    inverse: constraint.inverse,
                    matches: matches.get_mut(*leaf).map(std::mem::take).unwrap_or_default(),
                }
            }
            ExprNode::EachOf { children, .. } => TripleExprSolution::EachOf {
                solutions: children
                    .iter()
                    .map(|child| self.node_solution(*child, matches))
                    .collect(),
            },
            ExprNode::OneOf { children, .. } => TripleExprSolution::OneOf {
                solutions: children
                    .iter()
                    .map(|child| self.node_solution(*child, matches))
                    .collect(),
            },
        }
    }
}

fn multiply(max: Option<u64>, cardinality: Cardinality) -> Option<u64> {
    Some(max?.saturating_mul(cardinality.max?.into()))
}

/// Interval of repetition counts. `max` is `None` when unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Repetitions {
    min: u64,
    max: Option<u64>,
}

impl Repetitions {
    const ANY: Self = Self { min: 0, max: None };
    const NONE: Self = Self {
        min: 0,
        max: Some(0),
    };

    fn new(min: u64, max: Option<u64>) -> Option<Self> {
        if max.is_some_and(|max| max < min) {
            None
        } else {
            Some(Self { min, max })
        }
    }

    fn contains(self, count: u64) -> bool {
        self.min <= count && self.max.is_none_or(|max| count <= max)
    }

    fn of_leaf(count: u64, cardinality: Cardinality) -> Option<Self> {
        let min = u64::from(cardinality.min);
        if count == 0 {
            return Some(Self {
                min: 0,
                max: if min == 0 { None } else { Some(0) },
            });
        }
        let lower = match cardinality.max.map(u64::from) {
            Some(0) => return None,
            Some(max) => count.div_ceil(max),
            None => 1,
        };
        let upper = if min == 0 { None } else { Some(count / min) };
        Self::new(lower, upper)
    }

    /// Repetitions of a group whose body accepts `self`.
    fn of_group(self, cardinality: Cardinality) -> Option<Self> {
        let lower = if self.min == 0 {
            0
        } else {
            match cardinality.max.map(u64::from) {
                Some(0) => return None,
                Some(max) => self.min.div_ceil(max),
                None => 1,
            }
        };
        let upper = match (u64::from(cardinality.min), self.max) {
            (0, _) | (_, None) => None,
            (min, Some(max)) => Some(max / min),
        };
        Self::new(lower, upper)
    }

    fn intersection(self, other: Self) -> Option<Self> {
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self::new(self.min.max(other.min), max)
    }

    fn sum(self, other: Self) -> Self {
        Self {
            min: self.min.saturating_add(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                _ => None,
            },
        }
    }
}

/// Arcs sharing the same candidate leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArcGroup {
    /// Indices of the arcs, in neighborhood order.
    pub arcs: Vec<usize>,
    /// Where the arcs may go, in preference order: a leaf index, or `None` to leave the arc
    /// unmatched.
    pub slots: Vec<Option<usize>>,
}

/// Enumerates the distributions of each group's arcs over its slots.
///
/// The first distribution gives every arc to its first slot. Later ones move arcs towards later
/// slots, so leaves declared first are preferred.
#[derive(Debug)]
pub(crate) struct PartitionSearch {
    groups: Vec<ArcGroup>,
    parts: Vec<Vec<usize>>,
    started: bool,
    combinations: usize,
}

impl PartitionSearch {
    pub(crate) fn new(groups: Vec<ArcGroup>) -> Self {
        let parts = groups.iter().map(initial_parts).collect();
        Self {
            groups,
            parts,
            started: false,
            combinations: 0,
        }
    }

    /// Moves to the next distribution. Returns `false` once all have been seen.
    pub(crate) fn advance(
        &mut self,
        tracker: &mut LimitTracker,
    ) -> Result<bool, ValidationLimitError> {
        if self.started {
            if !self.step() {
                return Ok(false);
            }
        } else {
            self.started = true;
        }
        self.combinations += 1;
        tracker.record_combination()?;
        Ok(true)
    }

    /// Number of distributions visited.
    pub(crate) fn combinations(&self) -> usize {
        self.combinations
    }

    fn step(&mut self) -> bool {
        for (group, parts) in self.groups.iter().zip(&mut self.parts).rev() {
            if next_composition(parts) {
                return true;
            }
            *parts = initial_parts(group);
        }
        false
    }

    /// Number of arcs given to each leaf by the current distribution.
    pub(crate) fn counts(&self, leaf_count: usize) -> Vec<usize> {
        let mut counts = vec![0; leaf_count];
        for (group, parts) in self.groups.iter().zip(&self.parts) {
            for (slot, part) in group.slots.iter().zip(parts) {
                if let Some(leaf) = slot {
                    counts[*leaf] += part;
                }
            }
        }
        counts
    }

    /// The arcs given to each leaf by the current distribution, and the arcs left unmatched.
    pub(crate) fn assignment(&self, leaf_count: usize) -> (Vec<Vec<usize>>, Vec<usize>) {
        let mut by_leaf = vec![Vec::new(); leaf_count];
        let mut unmatched = Vec::new();
        for (group, parts) in self.groups.iter().zip(&self.parts) {
            let mut arcs = group.arcs.iter().copied();
            for (slot, part) in group.slots.iter().zip(parts) {
                let taken = arcs.by_ref().take(*part);
                match slot {
                    Some(leaf) => by_leaf[*leaf].extend(taken),
                    None => unmatched.extend(taken),
                }
            }
        }
        for arcs in &mut by_leaf {
            arcs.sort_unstable();
        }
        unmatched.sort_unstable();
        (by_leaf, unmatched)
    }
}

fn initial_parts(group: &ArcGroup) -> Vec<usize> {
    let mut parts = vec![0; group.slots.len()];
    if let Some(first) = parts.first_mut() {
        *first = group.arcs.len();
    }
    parts
}

/// Next composition of the same total, moving one unit to the right. Returns `false` when the
/// composition was the last one.
fn next_composition(parts: &mut [usize]) -> bool {
    let Some((last, init)) = parts.split_last_mut() else {
        return false;
    };
    let tail = std::mem::take(last);
    let Some(i) = init.iter().rposition(|part| *part > 0) else {
        *last = tail;
        return false;
    };
    init[i] -= 1;
    if i + 1 == init.len() {
        *last = tail + 1;
    } else {
        init[i + 1] = tail + 1;
    }
    true
}
