//! Branching steps: `union` and `coalesce`.
//!
//! Each branch is a nested pipeline. For every upstream traverser the step
//! runs the branches with that traverser as the only seed and emits what
//! they produce, re-weighted by the step's own coefficient. Branch outputs
//! are pulled one at a time; a branch is not started before the previous
//! one is exhausted.

use crate::coefficient::Coefficient;
use crate::error::Result;
use crate::pipeline::compiled_plan::Pipeline;
use crate::pipeline::function::{Capability, Function, StepHeader};
use crate::pipeline::processor::{ExecutionContext, Processor};
use crate::pipeline::registry::{Arity, Registry};
use crate::pipeline::traverser::Traverser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchRule {
    /// Every branch sees every traverser; outputs are concatenated in branch order.
    Union,
    /// Outputs of the first branch that produces anything.
    Coalesce,
}

#[derive(Clone)]
pub struct BranchFunction<C: Coefficient> {
    header: StepHeader<C>,
    rule: BranchRule,
    branches: Vec<Pipeline<C>>,
    /// Traversers routed into each branch during the current execution.
    routed: Vec<u64>,
}

impl<C: Coefficient> BranchFunction<C> {
    pub fn new(header: StepHeader<C>, rule: BranchRule, branches: Vec<Pipeline<C>>) -> Self {
        let routed = vec![0; branches.len()];
        Self {
            header,
            rule,
            branches,
            routed,
        }
    }

    pub fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    pub fn rule(&self) -> BranchRule {
        self.rule
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn routed(&self) -> &[u64] {
        &self.routed
    }

    /// Start branch `index` on `traverser`.
    ///
    /// Returns `None` once no further branch may run: every branch has been
    /// opened, or this is a coalesce and an earlier branch produced output.
    /// The run owns a fresh copy of the branch, so it is only pulled as far
    /// as the caller pulls it.
    pub fn open<'a>(
        &mut self,
        index: usize,
        found: bool,
        traverser: &Traverser<C>,
        ctx: &'a ExecutionContext,
    ) -> Option<Processor<'a, C>> {
        if index >= self.branches.len() || (found && self.rule == BranchRule::Coalesce) {
            return None;
        }
        self.routed[index] += 1;
        let branch = self.branches[index].duplicate();
        Some(Processor::owned(branch, std::iter::once(traverser.clone()), ctx).nested())
    }

    /// A branch output re-weighted by this step.
    pub fn rejoin(&self, traverser: Traverser<C>) -> Traverser<C> {
        traverser.split(
            traverser.value().clone(),
            &self.header.coefficient,
            self.header.label.as_deref(),
            false,
        )
    }

    pub fn reset(&mut self) {
        self.routed.iter_mut().for_each(|n| *n = 0);
        self.branches.iter_mut().for_each(Pipeline::reset);
    }

    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.reset();
        copy
    }
}

pub(crate) fn register<C: Coefficient>(registry: &mut Registry<C>) {
    for (opcode, rule) in [("union", BranchRule::Union), ("coalesce", BranchRule::Coalesce)] {
        registry.register(opcode, Capability::Branch, Arity::at_least(1), move |inst, ctx| {
            let branches = ctx.pipelines_from(inst, 0)?;
            Ok(Function::Branch(BranchFunction::new(ctx.header(inst), rule, branches)))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Bytecode, Instruction, Value};
    use crate::coefficient::LongCoefficient;
    use crate::pipeline::compiler::Compiler;

    type C = LongCoefficient;

    fn compile(code: &Bytecode<C>) -> Pipeline<C> {
        Compiler::new(Registry::standard()).compile(code).unwrap()
    }

    fn branch_step(opcode: &str, branches: Vec<Bytecode<C>>) -> BranchFunction<C> {
        let code = Bytecode::new().with(Instruction::new(opcode).with_args(branches));
        match compile(&code).steps_mut().remove(0) {
            Function::Branch(f) => f,
            other => panic!("expected a branch step, got {:?}", other),
        }
    }

    fn run(opcode: &str, branches: Vec<Bytecode<C>>, seed: Value) -> Vec<Value> {
        let code = Bytecode::new().with(Instruction::new(opcode).with_args(branches));
        let mut pipeline = compile(&code);
        let ctx = ExecutionContext::default();
        pipeline
            .execute(vec![seed], &ctx)
            .map(|r| r.unwrap().into_value())
            .collect()
    }

    fn constant(v: i64) -> Bytecode<C> {
        Bytecode::new().with(Instruction::new("constant").with_arg(v))
    }

    fn none() -> Bytecode<C> {
        Bytecode::new().with(Instruction::new("is").with_arg(-1i64))
    }

    fn unfold() -> Bytecode<C> {
        Bytecode::new().with(Instruction::new("unfold"))
    }

    #[test]
    fn test_union_concatenates_in_branch_order() {
        let out = run("union", vec![constant(1), constant(2)], Value::Int(0));
        assert_eq!(out, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_coalesce_takes_first_productive_branch() {
        let out = run("coalesce", vec![none(), unfold(), constant(3)], Value::from(vec![1i64, 2]));
        assert_eq!(out, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_coalesce_with_no_productive_branch_is_empty() {
        assert!(run("coalesce", vec![none(), none()], Value::Int(0)).is_empty());
    }

    #[test]
    fn test_open_is_lazy_and_routes() {
        let mut f = branch_step("union", vec![unfold(), constant(9)]);
        let ctx = ExecutionContext::default();
        let seed = Traverser::seed(Value::from(vec![1i64, 2, 3]));

        let mut first = f.open(0, false, &seed, &ctx).unwrap();
        assert_eq!(first.next().unwrap().unwrap().value(), &Value::Int(1));
        assert_eq!(f.routed(), &[1, 0]);

        assert!(f.open(1, true, &seed, &ctx).is_some());
        assert!(f.open(2, true, &seed, &ctx).is_none());
        assert_eq!(f.routed(), &[1, 1]);
    }

    #[test]
    fn test_coalesce_stops_opening_after_output() {
        let mut f = branch_step("coalesce", vec![constant(1), constant(2)]);
        let ctx = ExecutionContext::default();
        let seed = Traverser::seed(Value::Null);
        assert!(f.open(0, false, &seed, &ctx).is_some());
        assert!(f.open(1, true, &seed, &ctx).is_none());
        assert!(f.open(1, false, &seed, &ctx).is_some());
    }

    #[test]
    fn test_rejoin_applies_step_coefficient() {
        let mut f = branch_step("union", vec![constant(1)]);
        f.header.coefficient = LongCoefficient(4);
        let out = f.rejoin(Traverser::new(LongCoefficient(2), Value::Int(1)));
        assert_eq!(out.coefficient(), &LongCoefficient(8));
    }

    #[test]
    fn test_routed_counts_reset() {
        let mut f = branch_step("union", vec![constant(1)]);
        let ctx = ExecutionContext::default();
        let seed = Traverser::seed(Value::Int(0));
        f.open(0, false, &seed, &ctx);
        f.open(0, false, &seed, &ctx);
        assert_eq!(f.routed(), &[2]);
        assert_eq!(f.duplicate().routed(), &[0]);
    }
}
