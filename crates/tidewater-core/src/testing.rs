//! Query fixtures shared by unit tests.

use crate::operator::Condition;
use crate::plan::{QueryBuilder, QueryContainer};
use crate::schema::{Schema, SchemaRef};
use crate::value::{Comparator, Value, ValueType};
use crate::window::Window;

/// Helper to create a one-attribute integer schema.
pub(crate) fn int_schema(name: &str) -> SchemaRef {
    Schema::of(&[(name, ValueType::Int)])
}

/// Helper to create an equality condition between two attributes.
pub(crate) fn eq(left: &str, right: &str) -> Condition {
    Condition::attributes(left, Comparator::Eq, right)
}

/// Five streams, one relation read twice, three window joins and a mean:
///
/// ```text
/// result = select(avg)
/// avg    = mean(final)
/// final  = join(A_B_R, C_R_D_E)
/// A_B_R  = join(A, B_R)        B_R = combine(B, R)
/// C_R_D_E = join(C_R, D_E)     C_R = combine(C, R)
/// D_E    = join(D, E)
/// ```
pub(crate) fn big_query() -> QueryContainer {
    let w = Window::tuples(10, 10);
    QueryBuilder::new()
        .relation("R", int_schema("r"))
        .stream("A", int_schema("a"))
        .stream("B", int_schema("b"))
        .stream("C", int_schema("c"))
        .stream("D", int_schema("d"))
        .stream("E", int_schema("e"))
        .combine("B_R", "B", "R", eq("b", "r"))
        .join("A_B_R", ("A", w), ("B_R", w), eq("a", "b"))
        .combine("C_R", "C", "R", eq("c", "r"))
        .join("D_E", ("D", w), ("E", w), eq("d", "e"))
        .join("C_R_D_E", ("C_R", w), ("D_E", w), eq("c", "d"))
        .join("final", ("A_B_R", w), ("C_R_D_E", w), eq("a", "c"))
        .mean("avg", "final", "a", w)
        .select(
            "result",
            "avg",
            Condition::constant("a", Comparator::Gt, Value::Float(0.0)),
        )
        .build()
        .unwrap()
}

/// `result = mean(combine(A, R))` over a tumbling window of `width`.
pub(crate) fn mean_over_relation(width: u64) -> QueryContainer {
    QueryBuilder::new()
        .relation("R", Schema::of(&[("id", ValueType::Int), ("price", ValueType::Int)]))
        .stream("A", int_schema("goods_id"))
        .combine("A_R", "A", "R", eq("goods_id", "id"))
        .mean("result", "A_R", "price", Window::tuples(width, width))
        .build()
        .unwrap()
}
