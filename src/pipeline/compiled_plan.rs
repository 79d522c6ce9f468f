use super::function::{Capability, Function};
use super::processor::{ExecutionContext, Processor};
use crate::bytecode::Value;
use crate::coefficient::Coefficient;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Compiled pipeline: steps in bytecode order.
///
/// Equality and hashing are structural: two pipelines are equal when their
/// steps have equal opcodes, labels, coefficients and arguments, regardless
/// of accumulated state or compile statistics.
pub struct Pipeline<C: Coefficient> {
    steps: Vec<Function<C>>,

    /// Compilation statistics
    stats: PlanStats,
}

/// Statistics about the compiled pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Number of top-level steps
    pub total_steps: usize,

    pub initializing: usize,
    pub flat_map: usize,
    pub map: usize,
    pub filter: usize,
    pub branch: usize,
    pub reduce: usize,

    /// Nested pipelines owned directly by branch and `where` steps
    pub nested_pipelines: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl PlanStats {
    fn collect<C: Coefficient>(steps: &[Function<C>], compile_time_us: u64) -> Self {
        let mut stats = PlanStats {
            total_steps: steps.len(),
            compile_time_us,
            ..Default::default()
        };
        for step in steps {
            match step.capability() {
                Capability::Initializing => stats.initializing += 1,
                Capability::FlatMap => stats.flat_map += 1,
                Capability::Map => stats.map += 1,
                Capability::Filter => stats.filter += 1,
                Capability::Branch => stats.branch += 1,
                Capability::Reduce => stats.reduce += 1,
            }
            stats.nested_pipelines += step.children();
        }
        stats
    }
}

impl<C: Coefficient> Pipeline<C> {
    pub(crate) fn new(steps: Vec<Function<C>>, compile_time_us: u64) -> Self {
        let stats = PlanStats::collect(&steps, compile_time_us);
        Self { steps, stats }
    }

    pub fn steps(&self) -> &[Function<C>] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut Vec<Function<C>> {
        &mut self.steps
    }

    pub(crate) fn into_steps(self) -> Vec<Function<C>> {
        self.steps
    }

    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has any steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True when the first step produces its own traversers.
    pub fn starts_with_source(&self) -> bool {
        self.steps
            .first()
            .is_some_and(|f| f.capability() == Capability::Initializing)
    }

    /// Clear all per-execution state, including nested pipelines.
    pub fn reset(&mut self) {
        self.steps.iter_mut().for_each(Function::reset);
    }

    /// Structurally equal pipeline with fresh, unshared state.
    pub fn duplicate(&self) -> Self {
        Self {
            steps: self.steps.iter().map(Function::duplicate).collect(),
            stats: self.stats.clone(),
        }
    }

    /// Start a lazy execution.
    ///
    /// With no seeds, a pipeline headed by an initializing step runs that
    /// step once; any other pipeline yields nothing. With seeds, each seed
    /// becomes an identity-coefficient traverser fed to the first step.
    pub fn execute<'a>(&'a mut self, seeds: Vec<Value>, ctx: &'a ExecutionContext) -> Processor<'a, C> {
        tracing::debug!("Executing {} with {} seed(s)", self, seeds.len());
        if seeds.is_empty() {
            Processor::new(self, ctx)
        } else {
            Processor::with_seeds(self, seeds, ctx)
        }
    }
}

impl<C: Coefficient> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

impl<C: Coefficient> PartialEq for Pipeline<C> {
    fn eq(&self, other: &Self) -> bool {
        self.steps == other.steps
    }
}

impl<C: Coefficient> Eq for Pipeline<C> {}

impl<C: Coefficient> Hash for Pipeline<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.steps.hash(state);
    }
}

impl<C: Coefficient> fmt::Display for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", step)?;
        }
        write!(f, "]")
    }
}

impl<C: Coefficient> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps)
            .field("stats", &self.stats)
            .finish()
    }
}
