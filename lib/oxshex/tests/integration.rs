//! Integration tests for ShEx validation.
//!
//! These tests cover end-to-end validation scenarios on graphs parsed from Turtle, recursive
//! schemas and the interaction between the validator and its hooks.

use oxrdf::vocab::xsd;
use oxrdf::{Graph, Literal, NamedNode, Term, Triple};
use oxrdfio::{RdfFormat, RdfParser};
use oxshex::{
    Cardinality, Evidence, NodeConstraint, NodeKind, SemanticAction, SemanticActionContext, Shape,
    ShapeExpression, ShapeLabel, ShapesSchema, ShapesSchemaBuilder, ShexGraph,
    ShexValidationError, ShexValidator, StringFacet, TripleConstraint, TripleExprGroup,
    TripleExprSolution, TripleExpression, ValidationResult, ValueSetValue, ViolationReason,
};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Helper Functions
// =============================================================================

/// Helper to parse a Turtle string into a Graph.
fn parse_turtle(turtle: &str) -> Graph {
    let mut graph = Graph::new();
    let turtle = format!("@prefix ex: <http://example.org/> .\n{turtle}");
    let parser = RdfParser::from_format(RdfFormat::Turtle);
    for quad_result in parser.for_reader(turtle.as_bytes()) {
        let quad = quad_result.expect("Failed to parse turtle");
        graph.insert(quad.as_ref());
    }
    graph
}

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/{name}"))
}

fn term(name: &str) -> Term {
    ex(name).into()
}

fn label(name: &str) -> ShapeLabel {
    ex(name).into()
}

fn literal() -> ShapeExpression {
    NodeConstraint::with_node_kind(NodeKind::Literal).into()
}

/// `ex:S1 { ex:name LITERAL }`
fn s1() -> ShapeExpression {
    Shape::with_expression(
        TripleConstraint::with_value_expr(ex("name"), literal())
            .with_cardinality(Cardinality::exactly(1)),
    )
    .into()
}

/// `ex:Person { ex:name LITERAL ; ex:knows @ex:Person * }`
fn person() -> ShapeExpression {
    Shape::with_expression(TripleExpression::each_of([
        TripleConstraint::with_value_expr(ex("name"), literal()).into(),
        TripleConstraint::with_value_expr(ex("knows"), ShapeExpression::shape_ref(label("Person")))
            .with_cardinality(Cardinality::zero_or_more())
            .into(),
    ]))
    .into()
}

fn schema(shapes: impl IntoIterator<Item = (&'static str, ShapeExpression)>) -> ShapesSchema {
    let mut builder = ShapesSchemaBuilder::new();
    for (name, expr) in shapes {
        builder.add_shape(label(name), expr).expect("Duplicate shape");
    }
    builder.build_checked().expect("Invalid schema")
}

fn validate(validator: &ShexValidator, graph: &Graph, node: &str, shape: &str) -> ValidationResult {
    validator
        .validate(graph, &term(node), &label(shape))
        .expect("Validation fault")
}

// =============================================================================
// End-to-End Validation Tests
// =============================================================================

#[test]
fn test_single_name_conforms() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    let data = parse_turtle(r#"ex:alice ex:name "Alice" ."#);

    let result = validate(&validator, &data, "alice", "S1");
    assert!(result.conforms(), "{result}");
    assert_eq!(result.shape(), Some(&label("S1")));
    let Some(Evidence::Shape {
        solution: Some(solution),
        unmatched,
    }) = result.evidence()
    else {
        panic!("Expected shape evidence, found {:?}", result.evidence());
    };
    assert!(unmatched.is_empty());
    assert_eq!(
        solution.triples(),
        [&Triple::new(
            ex("alice"),
            ex("name"),
            Literal::new_simple_literal("Alice")
        )]
    );
}

#[test]
fn test_two_names_violate_cardinality() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    let data = parse_turtle(r#"ex:alice ex:name "Alice", "Alicia" ."#);

    let result = validate(&validator, &data, "alice", "S1");
    assert!(!result.conforms());
    assert_eq!(
        result.reasons(),
        [ViolationReason::CardinalityViolation {
            predicate: ex("name"),
            inverse: false,
            count: 2,
            cardinality: Cardinality::exactly(1),
        }]
    );
}

#[test]
fn test_missing_name_violates_cardinality() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    let data = parse_turtle(r#"ex:alice ex:age 30 ."#);

    let result = validate(&validator, &data, "alice", "S1");
    assert!(matches!(
        result.reasons(),
        [ViolationReason::CardinalityViolation { count: 0, .. }]
    ));
}

#[test]
fn test_wrong_value_kind() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    let data = parse_turtle(r#"ex:alice ex:name ex:bob ."#);

    let result = validate(&validator, &data, "alice", "S1");
    let [ViolationReason::ValueMismatch { value, causes, .. }] = result.reasons() else {
        panic!("Expected a value mismatch, found {result}");
    };
    assert_eq!(value, &term("bob"));
    assert!(!causes.is_empty());
}

#[test]
fn test_open_shape_allows_other_predicates() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    let data = parse_turtle(r#"ex:alice ex:name "Alice" ; ex:age 30 ."#);

    let result = validate(&validator, &data, "alice", "S1");
    assert!(result.conforms());
    let Some(Evidence::Shape { unmatched, .. }) = result.evidence() else {
        panic!("Expected shape evidence");
    };
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].predicate, ex("age"));
}

#[test]
fn test_closed_shape_rejects_other_predicates() {
    let ShapeExpression::Shape(shape) = s1() else {
        unreachable!()
    };
    let validator = ShexValidator::new(schema([("Closed", shape.closed().into())]));
    let data = parse_turtle(r#"ex:alice ex:name "Alice" ; ex:age 30 ."#);

    let result = validate(&validator, &data, "alice", "Closed");
    let [ViolationReason::UnexpectedPredicate { triple }] = result.reasons() else {
        panic!("Expected an unexpected predicate, found {result}");
    };
    assert_eq!(triple.predicate, ex("age"));
}

#[test]
fn test_extra_predicate() {
    let color = || {
        Shape::with_expression(TripleConstraint::with_value_expr(
            ex("color"),
            NodeConstraint::with_values([ValueSetValue::from(ex("red"))]),
        ))
    };
    let validator = ShexValidator::new(schema([
        ("Strict", color().into()),
        ("Extra", color().with_extra(ex("color")).into()),
    ]));
    let data = parse_turtle("ex:n ex:color ex:red, ex:blue .");

    let strict = validate(&validator, &data, "n", "Strict");
    assert!(matches!(
        strict.reasons(),
        [ViolationReason::ValueMismatch { value: Term::NamedNode(v), .. }] if *v == ex("blue")
    ));

    let extra = validate(&validator, &data, "n", "Extra");
    assert!(extra.conforms(), "{extra}");
    let Some(Evidence::Shape { unmatched, .. }) = extra.evidence() else {
        panic!("Expected shape evidence");
    };
    assert_eq!(unmatched, &[Triple::new(ex("n"), ex("color"), ex("blue"))]);
}

#[test]
fn test_cardinality_violation_next_to_extra_predicate() {
    let shape = Shape::with_expression(TripleExpression::each_of([
        TripleConstraint::new(ex("name")).into(),
        TripleConstraint::new(ex("age")).into(),
    ]))
    .with_extra(ex("age"));
    let validator = ShexValidator::new(schema([("Person", shape.into())]));
    let data = parse_turtle(r#"ex:alice ex:name "Alice", "Alicia" ; ex:age 30 ."#);

    // The age triple can be matched or left aside, the name count is wrong either way.
    assert_eq!(
        validate(&validator, &data, "alice", "Person").reasons(),
        [ViolationReason::CardinalityViolation {
            predicate: ex("name"),
            inverse: false,
            count: 2,
            cardinality: Cardinality::exactly(1),
        }]
    );
}

#[test]
fn test_recursive_shape_terminates() {
    let validator = ShexValidator::new(schema([("Person", person())]));
    let data = parse_turtle(
        r#"
        ex:alice ex:name "Alice" ; ex:knows ex:bob .
        ex:bob ex:name "Bob" ; ex:knows ex:alice .
        ex:carol ex:name "Carol" ; ex:knows ex:carol .
        "#,
    );

    assert!(validate(&validator, &data, "alice", "Person").conforms());
    assert!(validate(&validator, &data, "carol", "Person").conforms());
}

#[test]
fn test_recursive_shape_propagates_failure() {
    let validator = ShexValidator::new(schema([("Person", person())]));
    let data = parse_turtle(
        r#"
        ex:alice ex:name "Alice" ; ex:knows ex:bob .
        ex:bob ex:knows ex:alice .
        "#,
    );

    let result = validate(&validator, &data, "alice", "Person");
    let [ViolationReason::ValueMismatch { value, causes, .. }] = result.reasons() else {
        panic!("Expected a value mismatch, found {result}");
    };
    assert_eq!(value, &term("bob"));
    assert!(matches!(
        causes.as_slice(),
        [ViolationReason::CardinalityViolation { count: 0, .. }]
    ));
}

#[test]
fn test_validation_is_repeatable() {
    let validator = ShexValidator::new(schema([("Person", person())]));
    let data = parse_turtle(
        r#"
        ex:alice ex:name "Alice" ; ex:knows ex:bob .
        ex:bob ex:name "Bob" ; ex:knows ex:alice .
        "#,
    );

    let first = validate(&validator, &data, "alice", "Person");
    let bob = validate(&validator, &data, "bob", "Person");
    assert_eq!(first, validate(&validator, &data, "alice", "Person"));
    assert_eq!(bob, validate(&validator, &data, "bob", "Person"));
}

#[test]
fn test_one_of() {
    let name = ShapeExpression::from(Shape::with_expression(TripleExpression::one_of([
        TripleConstraint::new(ex("name")).into(),
        TripleExpression::each_of([
            TripleConstraint::new(ex("given")).into(),
            TripleConstraint::new(ex("family")).into(),
        ]),
    ])));
    let validator = ShexValidator::new(schema([("Name", name)]));
    let data = parse_turtle(
        r#"
        ex:a ex:name "A" .
        ex:b ex:given "B" ; ex:family "C" .
        ex:c ex:name "A" ; ex:given "B" ; ex:family "C" .
        ex:d ex:given "B" .
        "#,
    );

    let a = validate(&validator, &data, "a", "Name");
    assert!(a.conforms());
    let Some(Evidence::Shape {
        solution: Some(TripleExprSolution::OneOf { solutions }),
        ..
    }) = a.evidence()
    else {
        panic!("Expected a OneOf solution");
    };
    assert_eq!(solutions.len(), 2);
    assert_eq!(solutions[0].triples().len(), 1);
    assert!(solutions[1].triples().is_empty());

    assert!(validate(&validator, &data, "b", "Name").conforms());
    assert!(matches!(
        validate(&validator, &data, "c", "Name").reasons(),
        [ViolationReason::NoSatisfyingPartition { combinations: 1 }]
    ));
    assert!(!validate(&validator, &data, "d", "Name").conforms());
}

#[test]
fn test_same_predicate_in_each_of() {
    // Two constraints on ex:p: one literal, one IRI. The partition must send each arc to the
    // constraint its value fits.
    let shape = ShapeExpression::from(Shape::with_expression(TripleExpression::each_of([
        TripleConstraint::with_value_expr(ex("p"), literal())
            .with_cardinality(Cardinality::exactly(2))
            .into(),
        TripleConstraint::with_value_expr(
            ex("p"),
            NodeConstraint::with_node_kind(NodeKind::Iri),
        )
        .into(),
    ])));
    let validator = ShexValidator::new(schema([("S", shape)]));
    let data = parse_turtle(
        r#"
        ex:ok ex:p "a", "b", ex:c .
        ex:ko ex:p "a", ex:b, ex:c .
        "#,
    );

    assert!(validate(&validator, &data, "ok", "S").conforms());
    assert!(!validate(&validator, &data, "ko", "S").conforms());
}

#[test]
fn test_repeated_group() {
    let shape = ShapeExpression::from(Shape::with_expression(TripleExpression::EachOf(
        TripleExprGroup::new([
            TripleConstraint::new(ex("key")).into(),
            TripleConstraint::new(ex("value")).into(),
        ])
        .with_cardinality(Cardinality::new(1, Some(2)).expect("Invalid cardinality")),
    )));
    let validator = ShexValidator::new(schema([("Pairs", shape)]));
    let data = parse_turtle(
        r#"
        ex:one ex:key 1 ; ex:value 1 .
        ex:two ex:key 1, 2 ; ex:value 1, 2 .
        ex:odd ex:key 1, 2 ; ex:value 1 .
        "#,
    );

    assert!(validate(&validator, &data, "one", "Pairs").conforms());
    assert!(validate(&validator, &data, "two", "Pairs").conforms());
    assert!(!validate(&validator, &data, "odd", "Pairs").conforms());
}

#[test]
fn test_inverse_constraint() {
    let parent = ShapeExpression::from(Shape::with_expression(
        TripleConstraint::new(ex("hasParent"))
            .with_inverse(true)
            .with_cardinality(Cardinality::one_or_more()),
    ));
    let validator = ShexValidator::new(schema([("Parent", parent)]));
    let data = parse_turtle("ex:child ex:hasParent ex:mother .");

    assert!(validate(&validator, &data, "mother", "Parent").conforms());
    assert_eq!(
        validate(&validator, &data, "child", "Parent").reasons(),
        [ViolationReason::CardinalityViolation {
            predicate: ex("hasParent"),
            inverse: true,
            count: 0,
            cardinality: Cardinality::one_or_more(),
        }]
    );
}

#[test]
fn test_boolean_combinations() {
    let validator = ShexValidator::new(schema([
        ("S1", s1()),
        (
            "NotS1",
            ShapeExpression::ShapeNot(Box::new(ShapeExpression::shape_ref(label("S1")))),
        ),
        (
            "NamedS1",
            ShapeExpression::ShapeAnd(vec![
                NodeConstraint::with_node_kind(NodeKind::Iri).into(),
                ShapeExpression::shape_ref(label("S1")),
            ]),
        ),
        (
            "S1OrLiteral",
            ShapeExpression::ShapeOr(vec![literal(), ShapeExpression::shape_ref(label("S1"))]),
        ),
    ]));
    let data = parse_turtle(
        r#"
        ex:alice ex:name "Alice" .
        ex:bob ex:age 3 .
        "#,
    );

    assert_eq!(
        validate(&validator, &data, "alice", "NotS1").reasons(),
        [ViolationReason::NegationViolated]
    );
    assert!(validate(&validator, &data, "bob", "NotS1").conforms());
    assert!(validate(&validator, &data, "alice", "NamedS1").conforms());
    assert!(!validate(&validator, &data, "bob", "NamedS1").conforms());

    let or = validate(&validator, &data, "alice", "S1OrLiteral");
    assert!(matches!(or.evidence(), Some(Evidence::Or { index: 1, .. })));
    assert!(!validate(&validator, &data, "bob", "S1OrLiteral").conforms());
}

#[test]
fn test_node_constraints() {
    let validator = ShexValidator::new(schema([(
        "Age",
        Shape::with_expression(TripleConstraint::with_value_expr(
            ex("age"),
            NodeConstraint::with_datatype(xsd::INTEGER.into_owned())
                .with_string_facet(StringFacet::Pattern {
                    pattern: "^[0-9]+$".into(),
                    flags: None,
                }),
        ))
        .into(),
    )]));
    let data = parse_turtle(
        r#"
        ex:a ex:age 30 .
        ex:b ex:age "30" .
        ex:c ex:age -3 .
        "#,
    );

    assert!(validate(&validator, &data, "a", "Age").conforms());
    assert!(!validate(&validator, &data, "b", "Age").conforms());
    assert!(!validate(&validator, &data, "c", "Age").conforms());
}

#[test]
fn test_validate_expression() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    let data = parse_turtle(r#"ex:alice ex:name "Alice" ."#);
    let expression = ShapeExpression::ShapeNot(Box::new(ShapeExpression::shape_ref(label("S1"))));

    let result = validator
        .validate_expression(&data, &term("alice"), &expression)
        .expect("Validation fault");
    assert!(!result.conforms());
    assert_eq!(result.shape(), None);
}

#[test]
fn test_validate_start() {
    let mut builder = ShapesSchemaBuilder::new();
    builder.add_shape(label("S1"), s1()).expect("Duplicate shape");
    builder.set_start(label("S1"));
    let validator = ShexValidator::new(builder.build());
    let data = parse_turtle(r#"ex:alice ex:name "Alice" ."#);

    let result = validator
        .validate_start(&data, &term("alice"))
        .expect("Validation fault");
    assert!(result.conforms());
    assert_eq!(result.shape(), Some(&label("S1")));
}

#[test]
fn test_unresolved_reference() {
    let mut builder = ShapesSchemaBuilder::new();
    builder
        .add_shape(
            label("S"),
            Shape::with_expression(TripleConstraint::with_value_expr(
                ex("p"),
                ShapeExpression::shape_ref(label("Missing")),
            )),
        )
        .expect("Duplicate shape");
    let validator = ShexValidator::new(builder.build());
    let data = parse_turtle("ex:n ex:p ex:o .");

    let direct = validate(&validator, &data, "n", "Missing");
    assert_eq!(
        direct.reasons(),
        [ViolationReason::UnresolvedReference {
            label: "<http://example.org/Missing>".into()
        }]
    );

    let nested = validate(&validator, &data, "n", "S");
    let [ViolationReason::ValueMismatch { causes, .. }] = nested.reasons() else {
        panic!("Expected a value mismatch, found {nested}");
    };
    assert!(matches!(
        causes.as_slice(),
        [ViolationReason::UnresolvedReference { .. }]
    ));
}

// =============================================================================
// Hooks
// =============================================================================

#[derive(Debug)]
struct ResolverDown;

impl fmt::Display for ResolverDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("resolver is down")
    }
}

impl Error for ResolverDown {}

#[test]
fn test_external_shape() {
    let schema = schema([("Ext", ShapeExpression::ShapeExternal)]);
    let data = Graph::new();

    let without = ShexValidator::new(schema.clone());
    assert!(matches!(
        validate(&without, &data, "a", "Ext").reasons(),
        [ViolationReason::ExternalShapeFailed { .. }]
    ));

    let with = ShexValidator::new(schema.clone()).with_external_resolver(
        |node: &Term, shape: Option<&ShapeLabel>| -> Result<bool, Box<dyn Error + Send + Sync>> {
            assert_eq!(shape, Some(&label("Ext")));
            Ok(*node == term("a"))
        },
    );
    let accepted = validate(&with, &data, "a", "Ext");
    assert_eq!(accepted.evidence(), Some(&Evidence::External));
    assert!(!validate(&with, &data, "b", "Ext").conforms());

    let failing = ShexValidator::new(schema).with_external_resolver(
        |_: &Term, _: Option<&ShapeLabel>| -> Result<bool, Box<dyn Error + Send + Sync>> {
            Err(Box::new(ResolverDown))
        },
    );
    assert!(matches!(
        failing.validate(&data, &term("a"), &label("Ext")),
        Err(ShexValidationError::External { .. })
    ));
}

#[test]
fn test_semantic_actions() {
    let check = ex("check");
    let mut builder = ShapesSchemaBuilder::new();
    builder
        .add_shape(
            label("S"),
            Shape::with_expression(
                TripleConstraint::new(ex("p"))
                    .with_cardinality(Cardinality::zero_or_more())
                    .with_sem_act(SemanticAction::new(check.clone(), Some("triple".into()))),
            )
            .with_sem_act(SemanticAction::new(check.clone(), Some("shape".into())))
            .with_sem_act(SemanticAction::new(ex("unknown"), None)),
        )
        .expect("Duplicate shape");
    let schema = builder.build_checked().expect("Invalid schema");
    let data = parse_turtle(
        r#"
        ex:good ex:p "x", "y" .
        ex:bad ex:p "x", "bad" .
        "#,
    );

    let shape_runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&shape_runs);
    let validator = ShexValidator::new(schema).with_semantic_action(
        check,
        move |action: &SemanticAction, context: &SemanticActionContext<'_>| {
            match (action.code.as_deref(), context.triple) {
                (Some("triple"), Some(triple)) => {
                    triple.object != Term::from(Literal::new_simple_literal("bad"))
                }
                (Some("shape"), None) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                    context.shape == Some(&label("S"))
                }
                _ => false,
            }
        },
    );

    assert!(validate(&validator, &data, "good", "S").conforms());
    assert_eq!(shape_runs.load(Ordering::Relaxed), 1);
    assert_eq!(
        validate(&validator, &data, "bad", "S").reasons(),
        [ViolationReason::SemanticActionFailed { action: ex("check") }]
    );
}

#[test]
fn test_start_actions() {
    let mut builder = ShapesSchemaBuilder::new();
    builder.add_shape(label("S1"), s1()).expect("Duplicate shape");
    builder.add_start_action(SemanticAction::new(ex("gate"), None));
    let schema = builder.build();
    let data = parse_turtle(r#"ex:alice ex:name "Alice" ."#);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let validator = ShexValidator::new(schema).with_semantic_action(
        ex("gate"),
        move |_: &SemanticAction, context: &SemanticActionContext<'_>| {
            counter.fetch_add(1, Ordering::Relaxed);
            *context.focus == term("alice")
        },
    );

    assert!(validate(&validator, &data, "alice", "S1").conforms());
    assert_eq!(
        validate(&validator, &data, "bob", "S1").reasons(),
        [ViolationReason::SemanticActionFailed { action: ex("gate") }]
    );
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

// =============================================================================
// Graph collaborator
// =============================================================================

struct BrokenGraph;

impl ShexGraph for BrokenGraph {
    type Error = ResolverDown;

    fn triples_with_subject(&self, _: &Term) -> Result<Vec<Triple>, ResolverDown> {
        Err(ResolverDown)
    }

    fn triples_with_object(&self, _: &Term) -> Result<Vec<Triple>, ResolverDown> {
        Err(ResolverDown)
    }
}

#[test]
fn test_graph_fault_is_an_error() {
    let validator = ShexValidator::new(schema([("S1", s1())]));
    assert!(matches!(
        validator.validate(&BrokenGraph, &term("alice"), &label("S1")),
        Err(ShexValidationError::Graph { .. })
    ));
    // Node constraints never touch the graph.
    let literal_only = ShexValidator::new(schema([("L", literal())]));
    assert!(
        literal_only
            .validate(
                &BrokenGraph,
                &Term::from(Literal::new_simple_literal("x")),
                &label("L")
            )
            .expect("Validation fault")
            .conforms()
    );
}
