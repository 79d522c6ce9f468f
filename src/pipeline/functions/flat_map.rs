//! Flat-mapping steps: `V`, `out`/`in`/`both`, `values`, `unfold`.

use crate::bytecode::Value;
use crate::coefficient::Coefficient;
use crate::error::Result;
use crate::pipeline::function::{Capability, Function, StepHeader, TraverserIter};
use crate::pipeline::processor::ExecutionContext;
use crate::pipeline::registry::{Arity, Registry};
use crate::pipeline::traverser::Traverser;
use crate::structure::{Direction, Structure, ValueIter};
use std::sync::Arc;

#[derive(Clone)]
pub enum FlatMapOp {
    /// All vertices of a structure. Resolution order: the compiled
    /// reference, a structure token carried by the input, the execution
    /// default.
    Vertices { structure: Option<Arc<dyn Structure>> },
    /// Adjacent vertices, optionally restricted to edge labels.
    Adjacent {
        direction: Direction,
        labels: Vec<String>,
    },
    /// Property of a vertex or entry of a map, zero or one result.
    Values(String),
    /// Elements of a list, entries of a map; anything else passes through.
    Unfold,
}

#[derive(Clone)]
pub struct FlatMapFunction<C: Coefficient> {
    header: StepHeader<C>,
    op: FlatMapOp,
}

impl<C: Coefficient> FlatMapFunction<C> {
    pub fn new(header: StepHeader<C>, op: FlatMapOp) -> Self {
        Self { header, op }
    }

    pub fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    pub fn apply(&mut self, traverser: &Traverser<C>, ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        let values = self.expand(traverser.value(), ctx)?;
        Ok(self.header.emit_all(traverser, values, ctx))
    }

    fn expand(&self, input: &Value, ctx: &ExecutionContext) -> Result<ValueIter> {
        match &self.op {
            FlatMapOp::Vertices { structure } => {
                let structure = match (structure, input) {
                    (Some(s), _) => Arc::clone(s),
                    (None, Value::Structure(token)) => ctx.resolve(token).ok_or_else(|| {
                        self.header
                            .failure(format!("structure '{}' is not available", token))
                    })?,
                    (None, _) => ctx.require_structure(&self.header)?,
                };
                structure.vertices()
            }
            FlatMapOp::Adjacent { direction, labels } => {
                let structure = ctx.require_structure(&self.header)?;
                structure.adjacent(input, *direction, labels)
            }
            FlatMapOp::Values(key) => match input {
                Value::Map(_) => Ok(Box::new(
                    input.get(&Value::Str(key.clone())).cloned().into_iter(),
                )),
                Value::Vertex(_) => {
                    let structure = ctx.require_structure(&self.header)?;
                    Ok(Box::new(structure.property(input, key)?.into_iter()))
                }
                other => Err(self.header.failure(format!(
                    "cannot read '{}' from a {}",
                    key,
                    other.type_name()
                ))),
            },
            FlatMapOp::Unfold => {
                let items: ValueIter = match input {
                    Value::List(items) => Box::new(items.clone().into_iter()),
                    Value::Map(entries) => Box::new(
                        entries
                            .clone()
                            .into_iter()
                            .map(|(k, v)| Value::List(vec![k, v])),
                    ),
                    other => Box::new(std::iter::once(other.clone())),
                };
                Ok(items)
            }
        }
    }
}

pub(crate) fn register<C: Coefficient>(registry: &mut Registry<C>) {
    registry.register("V", Capability::FlatMap, Arity::range(0, 1), |inst, ctx| {
        let structure = ctx.optional_structure(inst, 0)?;
        Ok(Function::FlatMap(FlatMapFunction::new(
            ctx.header(inst),
            FlatMapOp::Vertices { structure },
        )))
    });
    for direction in [Direction::Out, Direction::In, Direction::Both] {
        registry.register(
            direction.opcode(),
            Capability::FlatMap,
            Arity::at_least(0),
            move |inst, ctx| {
                let labels = ctx.strings_from(inst, 0)?;
                Ok(Function::FlatMap(FlatMapFunction::new(
                    ctx.header(inst),
                    FlatMapOp::Adjacent { direction, labels },
                )))
            },
        );
    }
    registry.register("values", Capability::FlatMap, Arity::exactly(1), |inst, ctx| {
        let key = ctx.string(inst, 0)?;
        Ok(Function::FlatMap(FlatMapFunction::new(
            ctx.header(inst),
            FlatMapOp::Values(key),
        )))
    });
    registry.register("unfold", Capability::FlatMap, Arity::exactly(0), |inst, ctx| {
        Ok(Function::FlatMap(FlatMapFunction::new(ctx.header(inst), FlatMapOp::Unfold)))
    });
}
