//! Instrumented plugin steps for observing how much work an execution does

use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use traversal_machine::error::Result;
use traversal_machine::pipeline::registry::Arity;
use traversal_machine::pipeline::{FunctionPlugin, StepHeader, TraverserIter};
use traversal_machine::{
    Capability, ExecutionContext, Function, LongCoefficient, Registry, Traverser, Value,
};

type C = LongCoefficient;

/// Shared tally of how often an instrumented step ran
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Initializing step yielding `0..n`, bumping the counter per item pulled
pub struct CountingSource {
    header: StepHeader<C>,
    n: i64,
    pulled: Counter,
}

impl FunctionPlugin<C> for CountingSource {
    fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    fn capability(&self) -> Capability {
        Capability::Initializing
    }

    fn produce(&mut self, _ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        let pulled = self.pulled.clone();
        Ok(Box::new((0..self.n).map(move |i| {
            pulled.bump();
            Ok(Traverser::seed(Value::Int(i)))
        })))
    }

    fn duplicate(&self) -> Box<dyn FunctionPlugin<C>> {
        Box::new(CountingSource {
            header: self.header.clone(),
            n: self.n,
            pulled: self.pulled.clone(),
        })
    }
}

/// Pass-through flat-map bumping the counter once per input traverser
pub struct CountingPassThrough {
    header: StepHeader<C>,
    applied: Counter,
}

impl FunctionPlugin<C> for CountingPassThrough {
    fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    fn capability(&self) -> Capability {
        Capability::FlatMap
    }

    fn apply(&mut self, traverser: &Traverser<C>, ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        self.applied.bump();
        Ok(self.header.emit_all(traverser, vec![traverser.value().clone()], ctx))
    }

    fn duplicate(&self) -> Box<dyn FunctionPlugin<C>> {
        Box::new(CountingPassThrough {
            header: self.header.clone(),
            applied: self.applied.clone(),
        })
    }
}

/// Initializing step yielding whatever arrives on `gate`, until every sender is gone
pub struct GatedSource {
    header: StepHeader<C>,
    gate: Receiver<i64>,
}

impl FunctionPlugin<C> for GatedSource {
    fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    fn capability(&self) -> Capability {
        Capability::Initializing
    }

    fn produce(&mut self, _ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        Ok(Box::new(
            self.gate
                .clone()
                .into_iter()
                .map(|v| Ok(Traverser::seed(Value::Int(v)))),
        ))
    }

    fn duplicate(&self) -> Box<dyn FunctionPlugin<C>> {
        Box::new(GatedSource {
            header: self.header.clone(),
            gate: self.gate.clone(),
        })
    }
}

/// Standard registry plus `gated_source`, fed from `gate`
pub fn gated_registry(gate: Receiver<i64>) -> Registry<C> {
    let mut registry = Registry::standard();
    registry.register(
        "gated_source",
        Capability::Initializing,
        Arity::exactly(0),
        move |inst, ctx| {
            Ok(Function::Plugin(Box::new(GatedSource {
                header: ctx.header(inst),
                gate: gate.clone(),
            })))
        },
    );
    registry
}

/// Standard registry plus `counting_source [n]` and `counting_pass`
pub fn instrumented_registry(pulled: &Counter, applied: &Counter) -> Registry<C> {
    let mut registry = Registry::standard();

    let pulled = pulled.clone();
    registry.register(
        "counting_source",
        Capability::Initializing,
        Arity::exactly(1),
        move |inst, ctx| {
            Ok(Function::Plugin(Box::new(CountingSource {
                header: ctx.header(inst),
                n: ctx.int(inst, 0)?,
                pulled: pulled.clone(),
            })))
        },
    );

    let applied = applied.clone();
    registry.register(
        "counting_pass",
        Capability::FlatMap,
        Arity::exactly(0),
        move |inst, ctx| {
            Ok(Function::Plugin(Box::new(CountingPassThrough {
                header: ctx.header(inst),
                applied: applied.clone(),
            })))
        },
    );

    registry
}
