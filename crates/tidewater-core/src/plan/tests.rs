//! Unit tests for query construction, linking and plan rendering.

use super::*;
use crate::operator::{Condition, OperatorShape};
use crate::schema::Schema;
use crate::testing::{big_query, eq, int_schema, mean_over_relation};
use crate::value::{Comparator, Value, ValueType};
use crate::window::Window;

#[test]
fn test_build_links_streams() {
    let query = mean_over_relation(5);
    let adapter = query.operator("A").unwrap();
    assert!(matches!(adapter.shape(), OperatorShape::Source { .. }));

    let join = query.operator("A_R").unwrap();
    match join.shape() {
        OperatorShape::Single { parent, input } => {
            assert_eq!(*parent, adapter.id());
            assert!(std::sync::Arc::ptr_eq(input, adapter.output()));
        }
        other => panic!("unexpected shape {other:?}"),
    }
    assert_eq!(join.schema().len(), 3);
    assert!(join.is_resource_reference());

    let mean = query.operator("result").unwrap();
    assert!(mean.is_aggregation());
    assert_eq!(mean.schema().attributes()[0].ty, ValueType::Float);
    assert!(query.input_stream("A").is_some());
    assert!(query.stream("result").is_some());
    assert_eq!(query.relation("R").unwrap().name(), "R");
}

#[test]
fn test_empty_plan() {
    assert!(matches!(QueryBuilder::new().build(), Err(PlanError::EmptyPlan)));
}

#[test]
fn test_duplicate_names() {
    let result = QueryBuilder::new()
        .stream("A", int_schema("a"))
        .stream("A", int_schema("a"))
        .build();
    assert!(matches!(result, Err(PlanError::DuplicateName(n)) if n == "A"));

    let result = QueryBuilder::new()
        .relation("R", int_schema("r"))
        .stream("R", int_schema("a"))
        .build();
    assert!(matches!(result, Err(PlanError::DuplicateName(_))));
}

#[test]
fn test_unknown_references() {
    let result = QueryBuilder::new()
        .stream("A", int_schema("a"))
        .select("s", "missing", Condition::True)
        .build();
    assert!(matches!(result, Err(PlanError::UnknownOperator(n)) if n == "missing"));

    let result = QueryBuilder::new()
        .stream("A", int_schema("a"))
        .combine("c", "A", "R", eq("a", "r"))
        .build();
    assert!(matches!(result, Err(PlanError::UnknownRelation(n)) if n == "R"));
}

#[test]
fn test_unknown_attributes() {
    let result = QueryBuilder::new()
        .stream("A", int_schema("a"))
        .select(
            "s",
            "A",
            Condition::constant("b", Comparator::Eq, Value::Int(1)),
        )
        .build();
    assert!(matches!(
        result,
        Err(PlanError::UnknownAttribute { attribute, .. }) if attribute == "b"
    ));

    let result = QueryBuilder::new()
        .stream("A", int_schema("a"))
        .project("p", "A", &["a", "z"])
        .build();
    assert!(matches!(result, Err(PlanError::UnknownAttribute { .. })));
}

#[test]
fn test_mean_requires_numeric_attribute() {
    let result = QueryBuilder::new()
        .stream("A", Schema::of(&[("name", ValueType::Str)]))
        .mean("m", "A", "name", Window::tuples(2, 2))
        .build();
    assert!(matches!(result, Err(PlanError::NonNumericAttribute { .. })));
}

#[test]
fn test_upstream_consumed_once() {
    let result = QueryBuilder::new()
        .stream("A", int_schema("a"))
        .select("s1", "A", Condition::True)
        .select("s2", "A", Condition::True)
        .build();
    assert!(matches!(result, Err(PlanError::SharedUpstream(n)) if n == "A"));
}

#[test]
fn test_projection_schema() {
    let query = QueryBuilder::new()
        .stream("A", Schema::of(&[("a", ValueType::Int), ("b", ValueType::Str)]))
        .project("p", "A", &["b"])
        .build()
        .unwrap();
    let schema = query.operator("p").unwrap().schema();
    assert_eq!(schema.len(), 1);
    assert_eq!(schema.attributes()[0].name, "b");
}

#[test]
fn test_post_order_is_upstream_first() {
    let query = big_query();
    let plan = query.into_plan("result").unwrap();
    let order = plan.operators();
    assert_eq!(order.len(), plan.tree().len());
    assert_eq!(*order.last().unwrap(), plan.root());
    for (pos, id) in order.iter().enumerate() {
        for parent in plan.tree()[*id].parents() {
            let parent_pos = order.iter().position(|o| *o == parent).unwrap();
            assert!(parent_pos < pos);
        }
    }
    // Left subtrees come first.
    assert_eq!(plan.tree()[order[0]].name(), "A");
}

#[test]
fn test_into_plan_unknown_root() {
    let query = mean_over_relation(3);
    assert!(matches!(query.into_plan("nope"), Err(PlanError::UnknownOperator(_))));
}

#[test]
fn test_dump_and_dot() {
    let plan = mean_over_relation(3).into_plan("result").unwrap();
    let dump = plan.dump();
    assert_eq!(
        dump,
        "result [mean] [3 rows, 3]\n  A_R [combine] <- R\n    A [stream]\n"
    );

    let dot = plan.to_dot();
    assert!(dot.starts_with("digraph query {"));
    assert!(dot.contains("\"rel_R\" -> n1 [style=dashed];"));
    assert!(dot.contains("n0 -> n1;"));
    assert!(dot.contains("n1 -> n2;"));
}
