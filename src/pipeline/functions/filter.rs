//! Filtering steps.
//!
//! `limit` and `dedup` keep per-execution state; it is cleared by `reset`
//! and never shared between duplicates.

use crate::bytecode::Value;
use crate::coefficient::Coefficient;
use crate::error::Result;
use crate::pipeline::compiled_plan::Pipeline;
use crate::pipeline::function::{Capability, Function, StepHeader};
use crate::pipeline::functions::Script;
use crate::pipeline::processor::{ExecutionContext, Processor};
use crate::pipeline::registry::{Arity, Registry};
use crate::pipeline::traverser::Traverser;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Comparison used by `is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compare {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Compare {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Compare::Eq,
            "neq" => Compare::Neq,
            "lt" => Compare::Lt,
            "lte" => Compare::Lte,
            "gt" => Compare::Gt,
            "gte" => Compare::Gte,
            _ => return None,
        })
    }

    /// Mixed int/float operands compare numerically; everything else uses
    /// the total order on values. A NaN operand satisfies only `neq`.
    pub fn holds(self, lhs: &Value, rhs: &Value) -> bool {
        let ordering = match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
            (a, b) => Some(a.cmp(b)),
        };
        match ordering {
            None => self == Compare::Neq,
            Some(o) => match self {
                Compare::Eq => o == Ordering::Equal,
                Compare::Neq => o != Ordering::Equal,
                Compare::Lt => o == Ordering::Less,
                Compare::Lte => o != Ordering::Greater,
                Compare::Gt => o == Ordering::Greater,
                Compare::Gte => o != Ordering::Less,
            },
        }
    }
}

impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compare::Eq => "eq",
            Compare::Neq => "neq",
            Compare::Lt => "lt",
            Compare::Lte => "lte",
            Compare::Gt => "gt",
            Compare::Gte => "gte",
        };
        f.write_str(s)
    }
}

#[derive(Clone)]
pub enum FilterOp<C: Coefficient> {
    Is { compare: Compare, operand: Value },
    /// Key present (and equal to `expected`, when given).
    Has { key: String, expected: Option<Value> },
    Script(Script),
    /// Passes when the sub-traversal yields at least one result.
    Where(Box<Pipeline<C>>),
    /// Passes the first `limit` traversers of an execution.
    Limit { limit: u64, passed: u64 },
    /// Passes the first traverser for each distinct value.
    Dedup { seen: HashSet<Value> },
}

#[derive(Clone)]
pub struct FilterFunction<C: Coefficient> {
    header: StepHeader<C>,
    op: FilterOp<C>,
}

impl<C: Coefficient> FilterFunction<C> {
    pub fn new(header: StepHeader<C>, op: FilterOp<C>) -> Self {
        Self { header, op }
    }

    pub fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    pub fn has_nested(&self) -> bool {
        matches!(self.op, FilterOp::Where(_))
    }

    pub fn test(&mut self, traverser: &Traverser<C>, ctx: &ExecutionContext) -> Result<bool> {
        let value = traverser.value();
        match &mut self.op {
            FilterOp::Is { compare, operand } => Ok(compare.holds(value, operand)),
            FilterOp::Has { key, expected } => {
                let found = match value {
                    Value::Map(_) => value.get(&Value::Str(key.clone())).cloned(),
                    Value::Vertex(_) => ctx.require_structure(&self.header)?.property(value, key)?,
                    other => {
                        return Err(self.header.failure(format!(
                            "a {} has no properties",
                            other.type_name()
                        )))
                    }
                };
                Ok(match (found, expected) {
                    (Some(v), Some(e)) => v == *e,
                    (Some(_), None) => true,
                    (None, _) => false,
                })
            }
            FilterOp::Script(script) => script
                .eval_predicate(value)
                .map_err(|e| self.header.failure(e.to_string())),
            FilterOp::Where(pipeline) => {
                let mut results =
                    Processor::with_traversers(pipeline.as_mut(), std::iter::once(traverser.clone()), ctx)
                        .nested();
                match results.next() {
                    Some(Ok(_)) => Ok(true),
                    Some(Err(e)) => Err(e),
                    None => Ok(false),
                }
            }
            FilterOp::Limit { limit, passed } => {
                if *passed < *limit {
                    *passed += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            FilterOp::Dedup { seen } => Ok(seen.insert(value.clone())),
        }
    }

    pub fn reset(&mut self) {
        match &mut self.op {
            FilterOp::Limit { passed, .. } => *passed = 0,
            FilterOp::Dedup { seen } => seen.clear(),
            FilterOp::Where(pipeline) => pipeline.reset(),
            FilterOp::Is { .. } | FilterOp::Has { .. } | FilterOp::Script(_) => {}
        }
    }

    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.reset();
        copy
    }
}

pub(crate) fn register<C: Coefficient>(registry: &mut Registry<C>) {
    registry.register("is", Capability::Filter, Arity::range(1, 2), |inst, ctx| {
        let (compare, operand) = if inst.args().len() == 1 {
            (Compare::Eq, ctx.value(inst, 0)?.clone())
        } else {
            let name = ctx.string(inst, 0)?;
            let compare = Compare::parse(&name)
                .ok_or_else(|| ctx.invalid(0, format!("unknown comparison '{}'", name)))?;
            (compare, ctx.value(inst, 1)?.clone())
        };
        Ok(Function::Filter(FilterFunction::new(
            ctx.header(inst),
            FilterOp::Is { compare, operand },
        )))
    });
    registry.register("has", Capability::Filter, Arity::range(1, 2), |inst, ctx| {
        let key = ctx.string(inst, 0)?;
        let expected = if inst.args().len() == 2 {
            Some(ctx.value(inst, 1)?.clone())
        } else {
            None
        };
        Ok(Function::Filter(FilterFunction::new(
            ctx.header(inst),
            FilterOp::Has { key, expected },
        )))
    });
    registry.register("filter", Capability::Filter, Arity::exactly(1), |inst, ctx| {
        let script = ctx.script(inst, 0)?;
        Ok(Function::Filter(FilterFunction::new(ctx.header(inst), FilterOp::Script(script))))
    });
    registry.register("where", Capability::Filter, Arity::exactly(1), |inst, ctx| {
        let pipeline = ctx.pipeline(inst, 0)?;
        Ok(Function::Filter(FilterFunction::new(
            ctx.header(inst),
            FilterOp::Where(Box::new(pipeline)),
        )))
    });
    registry.register("limit", Capability::Filter, Arity::exactly(1), |inst, ctx| {
        let n = ctx.int(inst, 0)?;
        let limit = u64::try_from(n).map_err(|_| ctx.invalid(0, "limit must not be negative"))?;
        Ok(Function::Filter(FilterFunction::new(
            ctx.header(inst),
            FilterOp::Limit { limit, passed: 0 },
        )))
    });
    registry.register("dedup", Capability::Filter, Arity::exactly(0), |inst, ctx| {
        Ok(Function::Filter(FilterFunction::new(
            ctx.header(inst),
            FilterOp::Dedup {
                seen: HashSet::new(),
            },
        )))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Bytecode, Instruction};
    use crate::coefficient::LongCoefficient;
    use crate::pipeline::compiler::compile;
    use proptest::prelude::*;

    type C = LongCoefficient;

    fn filter(op: FilterOp<C>) -> FilterFunction<C> {
        FilterFunction::new(StepHeader::new("test"), op)
    }

    /// Stateless filters: comparison, property and script predicates.
    fn stateless_filters() -> Vec<FilterFunction<C>> {
        let code = Bytecode::new()
            .with(Instruction::new("is").with_arg("gt").with_arg(10i64))
            .with(Instruction::new("is").with_arg(Value::Null))
            .with(Instruction::new("has").with_arg("age"))
            .with(Instruction::new("has").with_arg("age").with_arg(29i64))
            .with(Instruction::new("filter").with_arg("it > 3"));
        compile(&code, &Registry::standard())
            .unwrap()
            .steps_mut()
            .drain(..)
            .map(|f| match f {
                Function::Filter(f) => f,
                other => panic!("expected a filter step, got {:?}", other),
            })
            .collect()
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1.0e6..1.0e6f64).prop_map(Value::Float),
            "[a-z]{0,6}".prop_map(Value::Str),
            (any::<i64>(), "[a-z]{1,4}").prop_map(|(age, name)| {
                Value::map([
                    (Value::from("age"), Value::Int(age)),
                    (Value::from("name"), Value::Str(name)),
                ])
            }),
        ]
    }

    proptest! {
        #[test]
        fn test_stateless_filters_are_deterministic(value in arb_value()) {
            let ctx = ExecutionContext::default();
            let t = Traverser::seed(value);
            for mut f in stateless_filters() {
                let first = f.test(&t, &ctx).ok();
                prop_assert_eq!(f.test(&t, &ctx).ok(), first);
                prop_assert_eq!(f.test(&t, &ctx).ok(), first);
                prop_assert_eq!(f.duplicate().test(&t, &ctx).ok(), first);
            }
        }
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert!(Compare::Eq.holds(&Value::Int(2), &Value::Float(2.0)));
        assert!(Compare::Lt.holds(&Value::Int(1), &Value::Float(1.5)));
        assert!(Compare::Gte.holds(&Value::from("b"), &Value::from("a")));
        assert!(Compare::Neq.holds(&Value::Float(f64::NAN), &Value::Int(1)));
        assert!(!Compare::Eq.holds(&Value::Float(f64::NAN), &Value::Int(1)));
        assert_eq!(Compare::parse("lte"), Some(Compare::Lte));
        assert_eq!(Compare::parse("like"), None);
    }

    #[test]
    fn test_limit_counts_and_resets() {
        let ctx = ExecutionContext::default();
        let mut f = filter(FilterOp::Limit { limit: 2, passed: 0 });
        let t = Traverser::seed(Value::Int(1));
        let passed: Vec<bool> = (0..4).map(|_| f.test(&t, &ctx).unwrap()).collect();
        assert_eq!(passed, vec![true, true, false, false]);

        f.reset();
        assert!(f.test(&t, &ctx).unwrap());
    }

    #[test]
    fn test_dedup_duplicate_has_fresh_state() {
        let ctx = ExecutionContext::default();
        let mut f = filter(FilterOp::Dedup {
            seen: HashSet::new(),
        });
        let t = Traverser::seed(Value::Int(1));
        assert!(f.test(&t, &ctx).unwrap());
        assert!(!f.test(&t, &ctx).unwrap());

        let mut copy = f.duplicate();
        assert!(copy.test(&t, &ctx).unwrap());
        assert!(!f.test(&t, &ctx).unwrap());
    }

    #[test]
    fn test_has_on_map() {
        let ctx = ExecutionContext::default();
        let person = Value::map([(Value::from("age"), Value::Int(29))]);
        let t = Traverser::seed(person);
        assert!(filter(FilterOp::Has {
            key: "age".into(),
            expected: None
        })
        .test(&t, &ctx)
        .unwrap());
        assert!(!filter(FilterOp::Has {
            key: "age".into(),
            expected: Some(Value::Int(30))
        })
        .test(&t, &ctx)
        .unwrap());
    }

    #[test]
    fn test_has_on_scalar_fails() {
        let ctx = ExecutionContext::default();
        let err = filter(FilterOp::Has {
            key: "x".into(),
            expected: None,
        })
        .test(&Traverser::seed(Value::Int(1)), &ctx)
        .unwrap_err();
        assert!(err.is_execution_failure());
    }
}
