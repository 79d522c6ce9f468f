//! One-to-one steps.

use crate::bytecode::Value;
use crate::coefficient::Coefficient;
use crate::error::Result;
use crate::pipeline::function::{Capability, Function, StepHeader};
use crate::pipeline::functions::Script;
use crate::pipeline::processor::ExecutionContext;
use crate::pipeline::registry::{Arity, Registry};
use crate::pipeline::traverser::Traverser;

#[derive(Clone, Debug)]
pub enum MapOp {
    Identity,
    Constant(Value),
    /// Numeric increment.
    Incr(Value),
    /// Vertex id as an integer.
    Id,
    /// Value most recently recorded under a path label.
    Select(String),
    /// Recorded path as a list.
    Path,
    Script(Script),
}

#[derive(Clone)]
pub struct MapFunction<C: Coefficient> {
    header: StepHeader<C>,
    op: MapOp,
}

impl<C: Coefficient> MapFunction<C> {
    pub fn new(header: StepHeader<C>, op: MapOp) -> Self {
        Self { header, op }
    }

    pub fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    pub fn apply(&mut self, traverser: &Traverser<C>, ctx: &ExecutionContext) -> Result<Traverser<C>> {
        let value = self.compute(traverser)?;
        Ok(self.header.emit(traverser, value, ctx))
    }

    fn compute(&self, traverser: &Traverser<C>) -> Result<Value> {
        let input = traverser.value();
        match &self.op {
            MapOp::Identity => Ok(input.clone()),
            MapOp::Constant(v) => Ok(v.clone()),
            MapOp::Incr(amount) => input.checked_add(amount).ok_or_else(|| {
                self.header.failure(format!(
                    "cannot increment a {} by {}",
                    input.type_name(),
                    amount
                ))
            }),
            MapOp::Id => match input {
                Value::Vertex(id) => Ok(Value::Int(*id)),
                other => Err(self
                    .header
                    .failure(format!("a {} has no id", other.type_name()))),
            },
            MapOp::Select(label) => traverser
                .path()
                .and_then(|p| p.get(label))
                .cloned()
                .ok_or_else(|| self.header.failure(format!("no value labeled '{}'", label))),
            MapOp::Path => traverser
                .path()
                .map(|p| Value::List(p.values().cloned().collect()))
                .ok_or_else(|| self.header.failure("path is not being recorded")),
            MapOp::Script(script) => script
                .eval(input)
                .map_err(|e| self.header.failure(e.to_string())),
        }
    }
}

pub(crate) fn register<C: Coefficient>(registry: &mut Registry<C>) {
    registry.register("identity", Capability::Map, Arity::exactly(0), |inst, ctx| {
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Identity)))
    });
    registry.register("constant", Capability::Map, Arity::exactly(1), |inst, ctx| {
        let value = ctx.value(inst, 0)?.clone();
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Constant(value))))
    });
    registry.register("incr", Capability::Map, Arity::range(0, 1), |inst, ctx| {
        let amount = if inst.args().is_empty() {
            Value::Int(1)
        } else {
            let v = ctx.value(inst, 0)?;
            if !v.is_numeric() {
                return Err(ctx.invalid(0, format!("expected a number, found {}", v.type_name())));
            }
            v.clone()
        };
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Incr(amount))))
    });
    registry.register("id", Capability::Map, Arity::exactly(0), |inst, ctx| {
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Id)))
    });
    registry.register("select", Capability::Map, Arity::exactly(1), |inst, ctx| {
        let label = ctx.string(inst, 0)?;
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Select(label))))
    });
    registry.register("path", Capability::Map, Arity::exactly(0), |inst, ctx| {
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Path)))
    });
    registry.register("map", Capability::Map, Arity::exactly(1), |inst, ctx| {
        let script = ctx.script(inst, 0)?;
        Ok(Function::Map(MapFunction::new(ctx.header(inst), MapOp::Script(script))))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficient::LongCoefficient;

    type C = LongCoefficient;

    fn apply(op: MapOp, input: Traverser<C>) -> Result<Traverser<C>> {
        MapFunction::new(StepHeader::<C>::new("test"), op).apply(&input, &ExecutionContext::default())
    }

    #[test]
    fn test_incr() {
        let out = apply(MapOp::Incr(Value::Int(1)), Traverser::seed(Value::Int(41))).unwrap();
        assert_eq!(out.value(), &Value::Int(42));
        let err = apply(MapOp::Incr(Value::Int(1)), Traverser::seed(Value::from("x"))).unwrap_err();
        assert!(err.is_execution_failure());
    }

    #[test]
    fn test_incr_overflow_fails() {
        assert!(apply(MapOp::Incr(Value::Int(1)), Traverser::seed(Value::Int(i64::MAX))).is_err());
    }

    #[test]
    fn test_id() {
        let out = apply(MapOp::Id, Traverser::seed(Value::Vertex(6))).unwrap();
        assert_eq!(out.value(), &Value::Int(6));
    }

    #[test]
    fn test_select_reads_labeled_value() {
        let t = Traverser::<C>::seed(Value::Vertex(1)).split(
            Value::Vertex(2),
            &LongCoefficient(1),
            Some("a"),
            false,
        );
        let t = t.split(Value::Vertex(3), &LongCoefficient(1), None, false);
        let out = apply(MapOp::Select("a".into()), t.clone()).unwrap();
        assert_eq!(out.value(), &Value::Vertex(2));

        let err = apply(MapOp::Select("b".into()), t).unwrap_err();
        assert!(err.to_string().contains("no value labeled 'b'"));
    }

    #[test]
    fn test_path_requires_recording() {
        assert!(apply(MapOp::Path, Traverser::seed(Value::Int(1))).is_err());
        let tracked = Traverser::<C>::tracked_seed(Value::Int(1));
        let out = apply(MapOp::Path, tracked).unwrap();
        assert_eq!(out.value(), &Value::List(vec![Value::Int(1)]));
    }
}
