//! Lazy, pull-based execution of a compiled pipeline.
//!
//! A [`Processor`] is a chain of stages, one per step, each an iterator over
//! the stage before it. Nothing runs until the caller pulls: pulling one
//! result does only the upstream work needed to produce it. Reduce stages
//! are the exception and drain their upstream on the first pull.
//!
//! The processor borrows its pipeline mutably for its whole lifetime, so a
//! pipeline runs at most one execution at a time. Concurrent executions use
//! independent duplicates.

use crate::bytecode::{StructureToken, Value};
use crate::coefficient::Coefficient;
use crate::config::ExecutionSettings;
use crate::error::Result;
use crate::pipeline::compiled_plan::Pipeline;
use crate::pipeline::function::{Capability, Function, StepHeader, TraverserIter};
use crate::pipeline::traverser::Traverser;
use crate::structure::{Structure, StructureRegistry};
use std::borrow::BorrowMut;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

type Stream<'a, C> = Box<dyn Iterator<Item = Result<Traverser<C>>> + 'a>;

/// Per-execution environment shared by every step.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Structure used by steps that carry no structure reference.
    pub structure: Option<Arc<dyn Structure>>,
    /// Tokens a traverser value may name at run time (e.g. after `source`).
    pub structures: StructureRegistry,
    /// Record every step in traverser paths.
    pub track_paths: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            track_paths: settings.track_paths,
            ..Self::default()
        }
    }

    pub fn with_structure(mut self, structure: Arc<dyn Structure>) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn with_structures(mut self, structures: StructureRegistry) -> Self {
        self.structures = structures;
        self
    }

    pub fn with_track_paths(mut self, track: bool) -> Self {
        self.track_paths = track;
        self
    }

    /// Resolve a token carried by a traverser value.
    pub fn resolve(&self, token: &StructureToken) -> Option<Arc<dyn Structure>> {
        self.structures.resolve(token)
    }

    /// The default structure, or an execution failure naming `step`.
    pub fn require_structure<C: Coefficient>(&self, step: &StepHeader<C>) -> Result<Arc<dyn Structure>> {
        self.structure
            .clone()
            .ok_or_else(|| step.failure("no structure available in this execution"))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("structure", &self.structure.as_ref().map(|s| s.name().to_string()))
            .field("structures", &self.structures)
            .field("track_paths", &self.track_paths)
            .finish()
    }
}

/// Lazy result sequence of one execution.
///
/// Yields `Ok` traversers until the pipeline is exhausted. If a step fails,
/// the error is yielded once and the processor is fused: every later call
/// returns `None`.
pub struct Processor<'a, C: Coefficient> {
    stream: Stream<'a, C>,
    done: bool,
    nested: bool,
    emitted: u64,
    started: Instant,
}

impl<'a, C: Coefficient> Processor<'a, C> {
    /// Execute without seeds: an initializing head runs once. Any other
    /// pipeline is not run at all and yields nothing.
    pub fn new(pipeline: &'a mut Pipeline<C>, ctx: &'a ExecutionContext) -> Self {
        if !pipeline.starts_with_source() {
            return Self::from_stream(Box::new(std::iter::empty()));
        }
        let trigger = Traverser::trigger(ctx.track_paths);
        Self::build(pipeline, Box::new(std::iter::once(Ok(trigger))), ctx)
    }

    /// Execute with seed values, each wrapped in an identity traverser.
    pub fn with_seeds<I>(pipeline: &'a mut Pipeline<C>, seeds: I, ctx: &'a ExecutionContext) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'a,
    {
        let track = ctx.track_paths;
        let source: Stream<'a, C> = Box::new(seeds.into_iter().map(move |v| {
            Ok(if track {
                Traverser::tracked_seed(v)
            } else {
                Traverser::seed(v)
            })
        }));
        Self::build(pipeline, source, ctx)
    }

    /// Execute with ready-made traversers (coefficients and paths kept).
    pub fn with_traversers<I>(pipeline: &'a mut Pipeline<C>, traversers: I, ctx: &'a ExecutionContext) -> Self
    where
        I: IntoIterator<Item = Traverser<C>>,
        I::IntoIter: 'a,
    {
        Self::build(pipeline, Box::new(traversers.into_iter().map(Ok)), ctx)
    }

    /// Execute a pipeline the processor takes ownership of.
    ///
    /// Used for branch runs, which outlive any single borrow of the step
    /// that owns the branch.
    pub(crate) fn owned<I>(pipeline: Pipeline<C>, traversers: I, ctx: &'a ExecutionContext) -> Self
    where
        I: IntoIterator<Item = Traverser<C>>,
        I::IntoIter: 'a,
    {
        let mut stream: Stream<'a, C> = Box::new(traversers.into_iter().map(Ok));
        for mut function in pipeline.into_steps() {
            function.reset();
            stream = Box::new(Stage::new(function, stream, ctx));
        }
        Self::from_stream(stream)
    }

    fn build(pipeline: &'a mut Pipeline<C>, source: Stream<'a, C>, ctx: &'a ExecutionContext) -> Self {
        pipeline.reset();
        let mut stream = source;
        for function in pipeline.steps_mut().iter_mut() {
            stream = Box::new(Stage::new(function, stream, ctx));
        }
        Self::from_stream(stream)
    }

    fn from_stream(stream: Stream<'a, C>) -> Self {
        Self {
            stream,
            done: false,
            nested: false,
            emitted: 0,
            started: Instant::now(),
        }
    }

    /// Mark as a sub-traversal run by another step; silences lifecycle logs.
    pub(crate) fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Results yielded so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<C: Coefficient> Iterator for Processor<'_, C> {
    type Item = Result<Traverser<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.next() {
            Some(Ok(t)) => {
                self.emitted += 1;
                Some(Ok(t))
            }
            Some(Err(e)) => {
                self.done = true;
                if !self.nested {
                    tracing::warn!(
                        "Execution aborted after {} result(s): {}",
                        self.emitted,
                        e
                    );
                }
                Some(Err(e))
            }
            None => {
                self.done = true;
                if !self.nested {
                    tracing::debug!(
                        "Execution finished: {} result(s) in {:?}",
                        self.emitted,
                        self.started.elapsed()
                    );
                }
                None
            }
        }
    }
}

/// One step of the chain, pulling from the stage before it.
///
/// The step is either borrowed from the caller's pipeline or owned by the
/// stage (branch runs over a fresh copy).
struct Stage<'a, C: Coefficient, F> {
    function: F,
    capability: Capability,
    upstream: Stream<'a, C>,
    ctx: &'a ExecutionContext,
    /// Expansion of the current input (initializing and flat-map steps).
    current: Option<TraverserIter<C>>,
    /// Branch runs of the current input (branch steps).
    branching: Option<BranchRun<'a, C>>,
    /// Pending outputs (reduce steps).
    buffer: VecDeque<Traverser<C>>,
    drained: bool,
}

/// Progress of one upstream traverser through the branches of a step.
struct BranchRun<'a, C: Coefficient> {
    input: Traverser<C>,
    next: usize,
    found: bool,
    current: Option<Processor<'a, C>>,
}

impl<'a, C: Coefficient, F: BorrowMut<Function<C>>> Stage<'a, C, F> {
    fn new(mut function: F, upstream: Stream<'a, C>, ctx: &'a ExecutionContext) -> Self {
        let capability = function.borrow_mut().capability();
        Self {
            function,
            capability,
            upstream,
            ctx,
            current: None,
            branching: None,
            buffer: VecDeque::new(),
            drained: false,
        }
    }

    fn next_expanded(&mut self) -> Option<Result<Traverser<C>>> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let input = match self.upstream.next()? {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            };
            match self.function.borrow_mut().flat_map(&input, self.ctx) {
                Ok(iter) => self.current = Some(iter),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn next_mapped(&mut self) -> Option<Result<Traverser<C>>> {
        let input = match self.upstream.next()? {
            Ok(t) => t,
            Err(e) => return Some(Err(e)),
        };
        Some(self.function.borrow_mut().map(&input, self.ctx))
    }

    fn next_filtered(&mut self) -> Option<Result<Traverser<C>>> {
        loop {
            let input = match self.upstream.next()? {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            };
            match self.function.borrow_mut().filter(input, self.ctx) {
                Ok(Some(t)) => return Some(Ok(t)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Stream the branch outputs of one input before pulling the next input.
    /// A branch is only opened once the one before it is exhausted.
    fn next_branched(&mut self) -> Option<Result<Traverser<C>>> {
        loop {
            let Some(run) = self.branching.as_mut() else {
                let input = match self.upstream.next()? {
                    Ok(t) => t,
                    Err(e) => return Some(Err(e)),
                };
                self.branching = Some(BranchRun {
                    input,
                    next: 0,
                    found: false,
                    current: None,
                });
                continue;
            };
            let step = match self.function.borrow_mut().as_branch() {
                Ok(step) => step,
                Err(e) => return Some(Err(e)),
            };
            if let Some(nested) = run.current.as_mut() {
                match nested.next() {
                    Some(Ok(t)) => {
                        run.found = true;
                        return Some(Ok(step.rejoin(t)));
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => run.current = None,
                }
            }
            match step.open(run.next, run.found, &run.input, self.ctx) {
                Some(nested) => {
                    run.current = Some(nested);
                    run.next += 1;
                }
                None => self.branching = None,
            }
        }
    }

    fn next_reduced(&mut self) -> Option<Result<Traverser<C>>> {
        if !self.drained {
            self.drained = true;
            let function = self.function.borrow_mut();
            for item in self.upstream.by_ref() {
                if let Err(e) = item.and_then(|t| function.accumulate(t)) {
                    return Some(Err(e));
                }
            }
            tracing::trace!("Step `{}` drained its upstream", function.opcode());
            match function.finish(self.ctx) {
                Ok(out) => self.buffer.extend(out),
                Err(e) => return Some(Err(e)),
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl<C: Coefficient, F: BorrowMut<Function<C>>> Iterator for Stage<'_, C, F> {
    type Item = Result<Traverser<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.capability {
            Capability::Initializing | Capability::FlatMap => self.next_expanded(),
            Capability::Map => self.next_mapped(),
            Capability::Filter => self.next_filtered(),
            Capability::Branch => self.next_branched(),
            Capability::Reduce => self.next_reduced(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Bytecode, Instruction};
    use crate::coefficient::LongCoefficient;
    use crate::pipeline::compiler::compile;
    use crate::pipeline::registry::Registry;
    use crate::structure::MemoryGraph;

    type C = LongCoefficient;

    fn build(code: Bytecode<C>) -> Pipeline<C> {
        compile(&code, &Registry::standard()).unwrap()
    }

    fn values(results: impl Iterator<Item = Result<Traverser<C>>>) -> Vec<Value> {
        results.map(|r| r.unwrap().into_value()).collect()
    }

    #[test]
    fn test_empty_pipeline_yields_seeds() {
        let mut p = build(Bytecode::new());
        let ctx = ExecutionContext::default();
        let out = values(p.execute(vec![Value::Int(1), Value::Int(2)], &ctx));
        assert_eq!(out, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_no_seeds_no_source_is_empty() {
        let mut p = build(Bytecode::new().with(Instruction::new("identity")));
        let ctx = ExecutionContext::default();
        assert_eq!(p.execute(Vec::new(), &ctx).count(), 0);
    }

    #[test]
    fn test_source_runs_once_per_seed() {
        let mut p = build(Bytecode::new().with(Instruction::new("inject").with_arg(7i64)));
        let ctx = ExecutionContext::default();
        assert_eq!(values(p.execute(Vec::new(), &ctx)), vec![Value::Int(7)]);
        assert_eq!(
            p.execute(vec![Value::Null, Value::Null], &ctx).count(),
            2
        );
    }

    #[test]
    fn test_modern_two_hop_count() {
        let mut p = build(
            Bytecode::new()
                .with(Instruction::new("V"))
                .with(Instruction::new("both"))
                .with(Instruction::new("both"))
                .with(Instruction::new("count")),
        );
        let ctx = ExecutionContext::default().with_structure(Arc::new(MemoryGraph::modern()));
        assert_eq!(values(p.execute(Vec::new(), &ctx)), Vec::<Value>::new());
        assert_eq!(values(p.execute(vec![Value::Null], &ctx)), vec![Value::Int(30)]);
    }

    #[test]
    fn test_processor_fuses_after_error() {
        let mut p = build(
            Bytecode::new()
                .with(Instruction::new("inject").with_arg(1i64).with_arg("x").with_arg(2i64))
                .with(Instruction::new("incr")),
        );
        let ctx = ExecutionContext::default();
        let mut results = p.execute(Vec::new(), &ctx);
        assert_eq!(results.next().unwrap().unwrap().value(), &Value::Int(2));
        assert!(results.next().unwrap().is_err());
        assert!(results.next().is_none());
        assert!(results.is_done());
    }

    #[test]
    fn test_filter_then_limit_is_lazy() {
        let mut p = build(
            Bytecode::new()
                .with(Instruction::new("inject").with_args([1i64, 2, 3, 4, 5]))
                .with(Instruction::new("is").with_arg("gt").with_arg(1i64))
                .with(Instruction::new("limit").with_arg(2i64)),
        );
        let ctx = ExecutionContext::default();
        assert_eq!(values(p.execute(Vec::new(), &ctx)), vec![Value::Int(2), Value::Int(3)]);
        // Limit state is reset between executions.
        assert_eq!(p.execute(Vec::new(), &ctx).count(), 2);
    }

    #[test]
    fn test_tracked_paths() {
        let mut p = build(
            Bytecode::new()
                .with(Instruction::new("out").with_arg("knows"))
                .with(Instruction::new("path")),
        );
        let ctx = ExecutionContext::default()
            .with_structure(Arc::new(MemoryGraph::modern()))
            .with_track_paths(true);
        let out = values(p.execute(vec![Value::Vertex(1)], &ctx));
        assert_eq!(
            out,
            vec![
                Value::List(vec![Value::Vertex(1), Value::Vertex(2)]),
                Value::List(vec![Value::Vertex(1), Value::Vertex(4)]),
            ]
        );
    }
}
