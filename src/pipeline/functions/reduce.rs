//! Reducing steps. They absorb the whole upstream stream before emitting.
//!
//! Coefficients are folded with `combine_merge`: `count` over traversers
//! with coefficients 2 and 3 yields 5.

use crate::bytecode::Value;
use crate::coefficient::Coefficient;
use crate::error::Result;
use crate::pipeline::function::{Capability, Function, StepHeader};
use crate::pipeline::processor::ExecutionContext;
use crate::pipeline::registry::{Arity, Registry};
use crate::pipeline::traverser::Traverser;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Merged coefficient of all traversers.
    Count,
    /// Sum of each value weighted by its coefficient.
    Sum,
    /// Map of value to merged coefficient.
    GroupCount,
    /// Traversers with equal values merged into one, in first-seen order.
    Barrier,
}

#[derive(Clone)]
enum ReduceState<C: Coefficient> {
    Count(C),
    Sum(Value),
    Groups(BTreeMap<Value, C>),
    Barrier {
        order: Vec<Traverser<C>>,
        index: HashMap<Value, usize>,
    },
}

impl<C: Coefficient> ReduceState<C> {
    fn initial(op: ReduceOp) -> Self {
        match op {
            ReduceOp::Count => ReduceState::Count(C::zero()),
            ReduceOp::Sum => ReduceState::Sum(Value::Int(0)),
            ReduceOp::GroupCount => ReduceState::Groups(BTreeMap::new()),
            ReduceOp::Barrier => ReduceState::Barrier {
                order: Vec::new(),
                index: HashMap::new(),
            },
        }
    }
}

#[derive(Clone)]
pub struct ReduceFunction<C: Coefficient> {
    header: StepHeader<C>,
    op: ReduceOp,
    state: ReduceState<C>,
}

impl<C: Coefficient> ReduceFunction<C> {
    pub fn new(header: StepHeader<C>, op: ReduceOp) -> Self {
        Self {
            header,
            op,
            state: ReduceState::initial(op),
        }
    }

    pub fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    pub fn op(&self) -> ReduceOp {
        self.op
    }

    pub fn accumulate(&mut self, traverser: Traverser<C>) -> Result<()> {
        match &mut self.state {
            ReduceState::Count(total) => {
                *total = total.combine_merge(traverser.coefficient());
            }
            ReduceState::Sum(total) => {
                let weight = traverser.coefficient().to_value();
                let next = traverser
                    .value()
                    .checked_mul(&weight)
                    .and_then(|weighted| total.checked_add(&weighted))
                    .ok_or_else(|| {
                        self.header.failure(format!(
                            "cannot sum a {} into a {}",
                            traverser.value().type_name(),
                            total.type_name()
                        ))
                    })?;
                *total = next;
            }
            ReduceState::Groups(groups) => {
                let merged = match groups.get(traverser.value()) {
                    Some(c) => c.combine_merge(traverser.coefficient()),
                    None => traverser.coefficient().clone(),
                };
                groups.insert(traverser.into_value(), merged);
            }
            ReduceState::Barrier { order, index } => match index.get(traverser.value()) {
                Some(&idx) => {
                    let merged = order[idx].coefficient().combine_merge(traverser.coefficient());
                    let kept = std::mem::replace(&mut order[idx], traverser);
                    order[idx] = kept.with_coefficient(merged);
                }
                None => {
                    index.insert(traverser.value().clone(), order.len());
                    order.push(traverser);
                }
            },
        }
        Ok(())
    }

    /// Emit the reduction. State is consumed; the next execution resets it.
    pub fn finish(&mut self, ctx: &ExecutionContext) -> Result<Vec<Traverser<C>>> {
        let state = std::mem::replace(&mut self.state, ReduceState::initial(self.op));
        let origin = Traverser::seed(Value::Null);
        let out = match state {
            ReduceState::Count(total) => vec![self.header.emit(&origin, total.to_value(), ctx)],
            ReduceState::Sum(total) => vec![self.header.emit(&origin, total, ctx)],
            ReduceState::Groups(groups) => {
                let map = Value::map(groups.into_iter().map(|(k, c)| (k, c.to_value())));
                vec![self.header.emit(&origin, map, ctx)]
            }
            ReduceState::Barrier { order, .. } => order
                .into_iter()
                .map(|t| {
                    t.split(
                        t.value().clone(),
                        &self.header.coefficient,
                        self.header.label.as_deref(),
                        false,
                    )
                })
                .collect(),
        };
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.state = ReduceState::initial(self.op);
    }
}

pub(crate) fn register<C: Coefficient>(registry: &mut Registry<C>) {
    for (opcode, op) in [
        ("count", ReduceOp::Count),
        ("sum", ReduceOp::Sum),
        ("group_count", ReduceOp::GroupCount),
        ("barrier", ReduceOp::Barrier),
    ] {
        registry.register(opcode, Capability::Reduce, Arity::exactly(0), move |inst, ctx| {
            Ok(Function::Reduce(ReduceFunction::new(ctx.header(inst), op)))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficient::{LongCoefficient, RealCoefficient};

    fn reduce<C: Coefficient>(op: ReduceOp, input: Vec<Traverser<C>>) -> Vec<Traverser<C>> {
        let mut f = ReduceFunction::new(StepHeader::new("test"), op);
        for t in input {
            f.accumulate(t).unwrap();
        }
        f.finish(&ExecutionContext::default()).unwrap()
    }

    fn long(c: u64, v: Value) -> Traverser<LongCoefficient> {
        Traverser::new(LongCoefficient(c), v)
    }

    #[test]
    fn test_count_merges_coefficients() {
        let out = reduce(ReduceOp::Count, vec![long(2, Value::Int(1)), long(3, Value::Int(9))]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value(), &Value::Int(5));
    }

    #[test]
    fn test_count_of_nothing_is_zero() {
        let out = reduce::<LongCoefficient>(ReduceOp::Count, Vec::new());
        assert_eq!(out[0].value(), &Value::Int(0));
        let out = reduce::<RealCoefficient>(ReduceOp::Count, Vec::new());
        assert_eq!(out[0].value(), &Value::Float(0.0));
    }

    #[test]
    fn test_sum_is_weighted() {
        let out = reduce(ReduceOp::Sum, vec![long(2, Value::Int(10)), long(1, Value::Int(5))]);
        assert_eq!(out[0].value(), &Value::Int(25));
    }

    #[test]
    fn test_sum_rejects_non_numeric() {
        let mut f = ReduceFunction::new(StepHeader::new("sum"), ReduceOp::Sum);
        let err = f.accumulate(long(1, Value::from("x"))).unwrap_err();
        assert!(err.is_execution_failure());
    }

    #[test]
    fn test_group_count() {
        let out = reduce(
            ReduceOp::GroupCount,
            vec![
                long(1, Value::from("a")),
                long(2, Value::from("b")),
                long(4, Value::from("a")),
            ],
        );
        let groups = out[0].value();
        assert_eq!(groups.get(&Value::from("a")), Some(&Value::Int(5)));
        assert_eq!(groups.get(&Value::from("b")), Some(&Value::Int(2)));
    }

    #[test]
    fn test_barrier_merges_equal_values_in_first_seen_order() {
        let out = reduce(
            ReduceOp::Barrier,
            vec![
                long(1, Value::Vertex(3)),
                long(1, Value::Vertex(1)),
                long(2, Value::Vertex(3)),
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value(), &Value::Vertex(3));
        assert_eq!(out[0].coefficient(), &LongCoefficient(3));
        assert_eq!(out[1].value(), &Value::Vertex(1));
    }

    #[test]
    fn test_finish_resets_state() {
        let mut f = ReduceFunction::new(StepHeader::new("count"), ReduceOp::Count);
        f.accumulate(long(7, Value::Null)).unwrap();
        let ctx = ExecutionContext::default();
        assert_eq!(f.finish(&ctx).unwrap()[0].value(), &Value::Int(7));
        assert_eq!(f.finish(&ctx).unwrap()[0].value(), &Value::Int(0));
    }
}
