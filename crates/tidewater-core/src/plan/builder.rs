//! Builder API for programmatic query construction.

use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};

use super::container::QueryContainer;
use super::error::PlanError;
use crate::operator::{
    AggregateFunction, AggregationState, Condition, Operator, OperatorBody, OperatorId,
    OperatorShape, OperatorTree, Projection, RelationJoin, ResourceRefState, Selection,
    WindowJoin,
};
use crate::relation::{Relation, RelationRef};
use crate::schema::{Schema, SchemaRef};
use crate::stream::{Stream, StreamRef};
use crate::tuple::{LogicalClock, RelationId};
use crate::value::ValueType;
use crate::window::Window;

#[derive(Debug)]
enum NodeDecl {
    Stream {
        schema: SchemaRef,
    },
    Select {
        parent: String,
        condition: Condition,
    },
    Project {
        parent: String,
        attributes: Vec<String>,
    },
    Combine {
        parent: String,
        relation: String,
        condition: Condition,
    },
    Join {
        left: String,
        right: String,
        left_window: Window,
        right_window: Window,
        condition: Condition,
    },
    Mean {
        parent: String,
        attribute: String,
        window: Window,
    },
    Elect {
        parent: String,
        window: Window,
    },
}

/// Fluent builder for query trees.
///
/// Operators are declared by name and refer to previously declared
/// streams or operators. Nothing is validated until [`QueryBuilder::build`].
///
/// # Example
///
/// ```rust,ignore
/// use tidewater_core::plan::QueryBuilder;
///
/// let query = QueryBuilder::new()
///     .relation("goods", goods_schema)
///     .stream("purchases", purchase_schema)
///     .combine("priced", "purchases", "goods", Condition::attributes("goods_id", Comparator::Eq, "id"))
///     .mean("avg_price", "priced", "price", Window::tuples(5, 5))
///     .build()?;
/// let plan = query.into_plan("avg_price")?;
/// ```
#[derive(Debug, Default)]
pub struct QueryBuilder {
    relations: Vec<(String, SchemaRef)>,
    nodes: Vec<(String, NodeDecl)>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a relation.
    #[must_use]
    pub fn relation(mut self, name: &str, schema: SchemaRef) -> Self {
        self.relations.push((name.to_string(), schema));
        self
    }

    /// Declares an external input stream and the adapter that reads it.
    #[must_use]
    pub fn stream(mut self, name: &str, schema: SchemaRef) -> Self {
        self.nodes.push((name.to_string(), NodeDecl::Stream { schema }));
        self
    }

    /// Adds a selection.
    #[must_use]
    pub fn select(mut self, name: &str, parent: &str, condition: Condition) -> Self {
        self.nodes.push((
            name.to_string(),
            NodeDecl::Select {
                parent: parent.to_string(),
                condition,
            },
        ));
        self
    }

    /// Adds a projection onto `attributes`.
    #[must_use]
    pub fn project(mut self, name: &str, parent: &str, attributes: &[&str]) -> Self {
        self.nodes.push((
            name.to_string(),
            NodeDecl::Project {
                parent: parent.to_string(),
                attributes: attributes.iter().map(ToString::to_string).collect(),
            },
        ));
        self
    }

    /// Adds a join of `parent` with `relation`.
    #[must_use]
    pub fn combine(mut self, name: &str, parent: &str, relation: &str, condition: Condition) -> Self {
        self.nodes.push((
            name.to_string(),
            NodeDecl::Combine {
                parent: parent.to_string(),
                relation: relation.to_string(),
                condition,
            },
        ));
        self
    }

    /// Adds a window join of two upstreams.
    #[must_use]
    pub fn join(
        mut self,
        name: &str,
        left: (&str, Window),
        right: (&str, Window),
        condition: Condition,
    ) -> Self {
        self.nodes.push((
            name.to_string(),
            NodeDecl::Join {
                left: left.0.to_string(),
                right: right.0.to_string(),
                left_window: left.1,
                right_window: right.1,
                condition,
            },
        ));
        self
    }

    /// Adds a windowed mean over `attribute`.
    #[must_use]
    pub fn mean(mut self, name: &str, parent: &str, attribute: &str, window: Window) -> Self {
        self.nodes.push((
            name.to_string(),
            NodeDecl::Mean {
                parent: parent.to_string(),
                attribute: attribute.to_string(),
                window,
            },
        ));
        self
    }

    /// Adds a windowed election emitting the newest tuple of each window.
    #[must_use]
    pub fn elect(mut self, name: &str, parent: &str, window: Window) -> Self {
        self.nodes.push((
            name.to_string(),
            NodeDecl::Elect {
                parent: parent.to_string(),
                window,
            },
        ));
        self
    }

    /// Validates the declarations and links the operator tree.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] on duplicate or unknown names, unresolved
    /// attributes, non-numeric means, or an upstream used twice.
    pub fn build(self) -> Result<QueryContainer, PlanError> {
        if self.nodes.is_empty() {
            return Err(PlanError::EmptyPlan);
        }

        let mut relations: FxHashMap<String, RelationRef> = FxHashMap::default();
        for (i, (name, schema)) in self.relations.into_iter().enumerate() {
            if relations.contains_key(&name) {
                return Err(PlanError::DuplicateName(name));
            }
            let id = RelationId(u32::try_from(i).unwrap_or(u32::MAX));
            relations.insert(name.clone(), Arc::new(Relation::new(id, &name, schema)));
        }

        let mut linker = Linker::default();
        for (name, spec) in self.nodes {
            if linker.names.contains_key(&name) || relations.contains_key(&name) {
                return Err(PlanError::DuplicateName(name));
            }
            let op = linker.link(&name, spec, &relations)?;
            linker.names.insert(name, op.id());
            linker.operators.push(op);
        }

        Ok(QueryContainer::new(
            OperatorTree::new(linker.operators),
            linker.names,
            relations,
            linker.inputs,
            Arc::new(LogicalClock::new()),
        ))
    }
}

#[derive(Default)]
struct Linker {
    operators: Vec<Operator>,
    names: FxHashMap<String, OperatorId>,
    inputs: FxHashMap<String, StreamRef>,
    consumed: FxHashSet<OperatorId>,
}

impl Linker {
    fn next_id(&self) -> OperatorId {
        OperatorId(u32::try_from(self.operators.len()).unwrap_or(u32::MAX))
    }

    /// Resolves an upstream and claims it for a single consumer.
    fn upstream(&mut self, name: &str) -> Result<(OperatorId, StreamRef, SchemaRef), PlanError> {
        let id = *self
            .names
            .get(name)
            .ok_or_else(|| PlanError::UnknownOperator(name.to_string()))?;
        if !self.consumed.insert(id) {
            return Err(PlanError::SharedUpstream(name.to_string()));
        }
        let op = &self.operators[id.0 as usize];
        Ok((id, Arc::clone(op.output()), Arc::clone(op.schema())))
    }

    fn link(
        &mut self,
        name: &str,
        spec: NodeDecl,
        relations: &FxHashMap<String, RelationRef>,
    ) -> Result<Operator, PlanError> {
        let id = self.next_id();
        let output = Stream::shared(name);
        let unknown = |attribute: String| PlanError::UnknownAttribute {
            operator: name.to_string(),
            attribute,
        };

        let op = match spec {
            NodeDecl::Stream { schema } => {
                let input = Stream::shared(name);
                self.inputs.insert(name.to_string(), Arc::clone(&input));
                Operator::new(
                    id,
                    name,
                    OperatorShape::Source { input },
                    OperatorBody::StreamAdapter,
                    schema,
                    output,
                )
            }
            NodeDecl::Select { parent, condition } => {
                let (parent, input, schema) = self.upstream(&parent)?;
                if let Some(missing) = condition.unresolved_attribute(&schema, None) {
                    return Err(unknown(missing));
                }
                Operator::new(
                    id,
                    name,
                    OperatorShape::Single { parent, input },
                    OperatorBody::Selection(Selection::new(condition)),
                    schema,
                    output,
                )
            }
            NodeDecl::Project { parent, attributes } => {
                let (parent, input, schema) = self.upstream(&parent)?;
                let indices = attributes
                    .into_iter()
                    .map(|a| schema.index_of(&a).ok_or_else(|| unknown(a)))
                    .collect::<Result<Vec<_>, _>>()?;
                Operator::new(
                    id,
                    name,
                    OperatorShape::Single { parent, input },
                    OperatorBody::Projection(Projection::new(indices.clone())),
                    Arc::new(schema.project(&indices)),
                    output,
                )
            }
            NodeDecl::Combine {
                parent,
                relation,
                condition,
            } => {
                let (parent, input, schema) = self.upstream(&parent)?;
                let relation = relations
                    .get(&relation)
                    .ok_or_else(|| PlanError::UnknownRelation(relation.clone()))?;
                if let Some(missing) =
                    condition.unresolved_attribute(&schema, Some(relation.schema()))
                {
                    return Err(unknown(missing));
                }
                Operator::new(
                    id,
                    name,
                    OperatorShape::Single { parent, input },
                    OperatorBody::RelationJoin(RelationJoin::new(condition)),
                    Arc::new(schema.concat(relation.schema())),
                    output,
                )
                .with_reference(ResourceRefState::new([Arc::clone(relation)]))
            }
            NodeDecl::Join {
                left,
                right,
                left_window,
                right_window,
                condition,
            } => {
                let (left, left_input, left_schema) = self.upstream(&left)?;
                let (right, right_input, right_schema) = self.upstream(&right)?;
                if let Some(missing) =
                    condition.unresolved_attribute(&left_schema, Some(&right_schema))
                {
                    return Err(unknown(missing));
                }
                Operator::new(
                    id,
                    name,
                    OperatorShape::Double {
                        left,
                        right,
                        left_input,
                        right_input,
                    },
                    OperatorBody::WindowJoin(WindowJoin::new(left_window, right_window, condition)),
                    Arc::new(left_schema.concat(&right_schema)),
                    output,
                )
            }
            NodeDecl::Mean {
                parent,
                attribute,
                window,
            } => {
                let (parent, input, schema) = self.upstream(&parent)?;
                let index = schema
                    .index_of(&attribute)
                    .ok_or_else(|| unknown(attribute.clone()))?;
                if !matches!(
                    schema.attribute(index).map(|a| a.ty),
                    Some(ValueType::Int | ValueType::Float)
                ) {
                    return Err(PlanError::NonNumericAttribute {
                        operator: name.to_string(),
                        attribute,
                    });
                }
                Operator::new(
                    id,
                    name,
                    OperatorShape::Single { parent, input },
                    OperatorBody::Aggregate,
                    Schema::of(&[(attribute.as_str(), ValueType::Float)]),
                    output,
                )
                .with_aggregation(AggregationState::new(
                    window,
                    AggregateFunction::Mean { attribute: index },
                ))
            }
            NodeDecl::Elect { parent, window } => {
                let (parent, input, schema) = self.upstream(&parent)?;
                Operator::new(
                    id,
                    name,
                    OperatorShape::Single { parent, input },
                    OperatorBody::Aggregate,
                    schema,
                    output,
                )
                .with_aggregation(AggregationState::new(window, AggregateFunction::Election))
            }
        };
        Ok(op)
    }
}
