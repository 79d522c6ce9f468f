//! Compiled step abstraction.
//!
//! Two-layer design:
//! - **`FunctionPlugin` trait**: for user-registered steps.
//! - **Built-in step structs**: one per capability, each holding an op enum.
//!   `Function` dispatches to them by `match`, no runtime type inspection.
//!
//! `Function` wraps either form so stages handle both uniformly. Every step
//! carries a [`StepHeader`] (opcode, label, coefficient, arguments) which is
//! the sole basis of structural equality and hashing.

use crate::bytecode::{write_step, Argument, Instruction, Value};
use crate::coefficient::Coefficient;
use crate::error::{MachineError, Result};
use crate::pipeline::functions::{
    BranchFunction, FilterFunction, FlatMapFunction, InitialFunction, MapFunction, ReduceFunction,
};
use crate::pipeline::processor::ExecutionContext;
use crate::pipeline::traverser::Traverser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Lazy output of a flat-mapping or initializing step.
pub type TraverserIter<C> = Box<dyn Iterator<Item = Result<Traverser<C>>>>;

/// What a step does with the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Produces traversers from a source; no upstream input needed.
    Initializing,
    /// One input, zero or more outputs.
    FlatMap,
    /// One input, exactly one output.
    Map,
    /// One input, the same value kept or dropped.
    Filter,
    /// Routes the input through nested sub-pipelines.
    Branch,
    /// Consumes the whole upstream stream before emitting.
    Reduce,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Initializing => "initializing",
            Capability::FlatMap => "flat-map",
            Capability::Map => "map",
            Capability::Filter => "filter",
            Capability::Branch => "branch",
            Capability::Reduce => "reduce",
        };
        f.write_str(name)
    }
}

/// Identity of a compiled step: the instruction it was compiled from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepHeader<C: Coefficient> {
    pub opcode: String,
    pub label: Option<String>,
    pub coefficient: C,
    pub args: Vec<Argument<C>>,
}

impl<C: Coefficient> StepHeader<C> {
    pub fn new(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            label: None,
            coefficient: C::identity(),
            args: Vec::new(),
        }
    }

    pub fn from_instruction(instruction: &Instruction<C>) -> Self {
        Self {
            opcode: instruction.opcode().to_string(),
            label: instruction.label().map(str::to_string),
            coefficient: instruction.coefficient().clone(),
            args: instruction.args().to_vec(),
        }
    }

    /// The traverser this step emits for `value`, derived from `parent`.
    pub fn emit(&self, parent: &Traverser<C>, value: Value, ctx: &ExecutionContext) -> Traverser<C> {
        parent.split(value, &self.coefficient, self.label.as_deref(), ctx.track_paths)
    }

    /// Lazily emit one traverser per value, pulling `values` only as the
    /// result is pulled.
    pub fn emit_all<I>(&self, parent: &Traverser<C>, values: I, ctx: &ExecutionContext) -> TraverserIter<C>
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        let parent = parent.clone();
        let coefficient = self.coefficient.clone();
        let label = self.label.clone();
        let track = ctx.track_paths;
        Box::new(
            values
                .into_iter()
                .map(move |v| Ok(parent.split(v, &coefficient, label.as_deref(), track))),
        )
    }

    /// An execution failure attributed to this step.
    pub fn failure(&self, message: impl Into<String>) -> MachineError {
        MachineError::execution(self.to_string(), message)
    }
}

impl<C: Coefficient> fmt::Display for StepHeader<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_step(f, &self.opcode, self.label.as_deref(), &self.coefficient, &self.args)
    }
}

/// Trait for user-defined steps.
///
/// Implement the method matching the declared [`Capability`]; the others
/// default to an execution failure. `Branch` is reserved for built-ins.
pub trait FunctionPlugin<C: Coefficient>: Send + Sync {
    fn header(&self) -> &StepHeader<C>;

    fn capability(&self) -> Capability;

    /// Initializing: produce the source stream.
    fn produce(&mut self, _ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        Err(self.header().failure("step does not produce"))
    }

    /// FlatMap: expand one traverser.
    fn apply(&mut self, _traverser: &Traverser<C>, _ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        Err(self.header().failure("step does not flat-map"))
    }

    /// Map: transform one traverser.
    fn map(&mut self, _traverser: &Traverser<C>, _ctx: &ExecutionContext) -> Result<Traverser<C>> {
        Err(self.header().failure("step does not map"))
    }

    /// Filter: keep or drop.
    fn test(&mut self, _traverser: &Traverser<C>, _ctx: &ExecutionContext) -> Result<bool> {
        Err(self.header().failure("step does not filter"))
    }

    /// Reduce: absorb one upstream traverser.
    fn accumulate(&mut self, _traverser: Traverser<C>) -> Result<()> {
        Err(self.header().failure("step does not reduce"))
    }

    /// Reduce: emit after upstream exhaustion.
    fn finish(&mut self, _ctx: &ExecutionContext) -> Result<Vec<Traverser<C>>> {
        Err(self.header().failure("step does not reduce"))
    }

    /// Clear per-execution state.
    fn reset(&mut self) {}

    /// Structural copy with unshared mutable state.
    fn duplicate(&self) -> Box<dyn FunctionPlugin<C>>;
}

/// A compiled, executable step.
pub enum Function<C: Coefficient> {
    Initial(InitialFunction<C>),
    FlatMap(FlatMapFunction<C>),
    Map(MapFunction<C>),
    Filter(FilterFunction<C>),
    Branch(BranchFunction<C>),
    Reduce(ReduceFunction<C>),
    Plugin(Box<dyn FunctionPlugin<C>>),
}

impl<C: Coefficient> Function<C> {
    pub fn header(&self) -> &StepHeader<C> {
        match self {
            Function::Initial(f) => f.header(),
            Function::FlatMap(f) => f.header(),
            Function::Map(f) => f.header(),
            Function::Filter(f) => f.header(),
            Function::Branch(f) => f.header(),
            Function::Reduce(f) => f.header(),
            Function::Plugin(p) => p.header(),
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Function::Initial(_) => Capability::Initializing,
            Function::FlatMap(_) => Capability::FlatMap,
            Function::Map(_) => Capability::Map,
            Function::Filter(_) => Capability::Filter,
            Function::Branch(_) => Capability::Branch,
            Function::Reduce(_) => Capability::Reduce,
            Function::Plugin(p) => p.capability(),
        }
    }

    pub fn opcode(&self) -> &str {
        &self.header().opcode
    }

    pub fn label(&self) -> Option<&str> {
        self.header().label.as_deref()
    }

    pub fn coefficient(&self) -> &C {
        &self.header().coefficient
    }

    /// Produce the source stream of an initializing step.
    pub fn produce(&mut self, ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        match self {
            Function::Initial(f) => f.produce(ctx),
            Function::Plugin(p) if p.capability() == Capability::Initializing => p.produce(ctx),
            other => Err(other.mismatch(Capability::Initializing)),
        }
    }

    /// Expand one upstream traverser.
    ///
    /// For initializing steps each produced traverser is re-rooted on the
    /// upstream one: its coefficient is combined sequentially with the
    /// upstream coefficient and the upstream path is carried over.
    pub fn flat_map(&mut self, traverser: &Traverser<C>, ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        if self.capability() == Capability::Initializing {
            let label = self.label().map(str::to_string);
            let produced = self.produce(ctx)?;
            let parent = traverser.clone();
            let track = ctx.track_paths;
            return Ok(Box::new(produced.map(move |item| {
                item.map(|seed| {
                    parent.split(
                        seed.value().clone(),
                        seed.coefficient(),
                        label.as_deref(),
                        track,
                    )
                })
            })));
        }
        match self {
            Function::FlatMap(f) => f.apply(traverser, ctx),
            Function::Plugin(p) if p.capability() == Capability::FlatMap => p.apply(traverser, ctx),
            other => Err(other.mismatch(Capability::FlatMap)),
        }
    }

    pub fn map(&mut self, traverser: &Traverser<C>, ctx: &ExecutionContext) -> Result<Traverser<C>> {
        match self {
            Function::Map(f) => f.apply(traverser, ctx),
            Function::Plugin(p) if p.capability() == Capability::Map => p.map(traverser, ctx),
            other => Err(other.mismatch(Capability::Map)),
        }
    }

    /// Keep (`Some`, with the step's coefficient and label applied) or drop.
    pub fn filter(&mut self, traverser: Traverser<C>, ctx: &ExecutionContext) -> Result<Option<Traverser<C>>> {
        let keep = match self {
            Function::Filter(f) => f.test(&traverser, ctx)?,
            Function::Plugin(p) if p.capability() == Capability::Filter => p.test(&traverser, ctx)?,
            other => return Err(other.mismatch(Capability::Filter)),
        };
        if !keep {
            return Ok(None);
        }
        let header = self.header();
        Ok(Some(traverser.split(
            traverser.value().clone(),
            &header.coefficient,
            header.label.as_deref(),
            false,
        )))
    }

    /// The branching step, for stages that drive its sub-pipelines.
    pub fn as_branch(&mut self) -> Result<&mut BranchFunction<C>> {
        match self {
            Function::Branch(f) => Ok(f),
            other => Err(other.mismatch(Capability::Branch)),
        }
    }

    pub fn accumulate(&mut self, traverser: Traverser<C>) -> Result<()> {
        match self {
            Function::Reduce(f) => f.accumulate(traverser),
            Function::Plugin(p) if p.capability() == Capability::Reduce => p.accumulate(traverser),
            other => Err(other.mismatch(Capability::Reduce)),
        }
    }

    pub fn finish(&mut self, ctx: &ExecutionContext) -> Result<Vec<Traverser<C>>> {
        match self {
            Function::Reduce(f) => f.finish(ctx),
            Function::Plugin(p) if p.capability() == Capability::Reduce => p.finish(ctx),
            other => Err(other.mismatch(Capability::Reduce)),
        }
    }

    /// Clear per-execution state (accumulators, counters, seen sets).
    pub fn reset(&mut self) {
        match self {
            Function::Initial(_) | Function::FlatMap(_) | Function::Map(_) => {}
            Function::Filter(f) => f.reset(),
            Function::Branch(f) => f.reset(),
            Function::Reduce(f) => f.reset(),
            Function::Plugin(p) => p.reset(),
        }
    }

    /// Structural copy whose mutable state is fresh and unshared.
    ///
    /// Structure handles are shared by reference; the structures themselves
    /// are never copied.
    pub fn duplicate(&self) -> Self {
        let mut copy = match self {
            Function::Initial(f) => Function::Initial(f.clone()),
            Function::FlatMap(f) => Function::FlatMap(f.clone()),
            Function::Map(f) => Function::Map(f.clone()),
            Function::Filter(f) => Function::Filter(f.duplicate()),
            Function::Branch(f) => Function::Branch(f.duplicate()),
            Function::Reduce(f) => Function::Reduce(f.clone()),
            Function::Plugin(p) => Function::Plugin(p.duplicate()),
        };
        copy.reset();
        copy
    }

    /// Nested sub-pipelines owned by this step.
    pub fn children(&self) -> usize {
        match self {
            Function::Branch(f) => f.branch_count(),
            Function::Filter(f) => usize::from(f.has_nested()),
            _ => 0,
        }
    }

    fn mismatch(&self, wanted: Capability) -> MachineError {
        self.header().failure(format!(
            "{} step cannot be driven as {}",
            self.capability(),
            wanted
        ))
    }
}

impl<C: Coefficient> Clone for Function<C> {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

impl<C: Coefficient> PartialEq for Function<C> {
    fn eq(&self, other: &Self) -> bool {
        self.capability() == other.capability() && self.header() == other.header()
    }
}

impl<C: Coefficient> Eq for Function<C> {}

impl<C: Coefficient> Hash for Function<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.capability().hash(state);
        self.header().hash(state);
    }
}

impl<C: Coefficient> fmt::Display for Function<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())
    }
}

impl<C: Coefficient> fmt::Debug for Function<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("capability", &self.capability())
            .field("step", &self.header().to_string())
            .finish()
    }
}
