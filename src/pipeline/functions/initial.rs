//! Initializing steps: `source` and `inject`.
//!
//! `source(ref)` emits a single traverser holding the structure token, so a
//! following `V` can read vertices from that structure. `inject(values...)`
//! emits one traverser per argument value.

use crate::bytecode::{StructureToken, Value};
use crate::coefficient::Coefficient;
use crate::error::Result;
use crate::pipeline::function::{Capability, Function, StepHeader, TraverserIter};
use crate::pipeline::processor::ExecutionContext;
use crate::pipeline::registry::{Arity, Registry};
use crate::pipeline::traverser::Traverser;
use crate::structure::Structure;
use std::sync::Arc;

#[derive(Clone)]
pub enum InitialOp {
    /// Emit the structure reference; the handle is held for the pipeline's lifetime.
    Source {
        token: StructureToken,
        structure: Arc<dyn Structure>,
    },
    /// Emit constant values.
    Inject(Vec<Value>),
}

#[derive(Clone)]
pub struct InitialFunction<C: Coefficient> {
    header: StepHeader<C>,
    op: InitialOp,
}

impl<C: Coefficient> InitialFunction<C> {
    pub fn new(header: StepHeader<C>, op: InitialOp) -> Self {
        Self { header, op }
    }

    pub fn header(&self) -> &StepHeader<C> {
        &self.header
    }

    pub fn op(&self) -> &InitialOp {
        &self.op
    }

    /// Traversers carry the step coefficient; paths are attached when
    /// the produced traversers are re-rooted on their trigger.
    pub fn produce(&mut self, _ctx: &ExecutionContext) -> Result<TraverserIter<C>> {
        let coefficient = self.header.coefficient.clone();
        match &self.op {
            InitialOp::Source { token, structure } => {
                tracing::trace!("source emits '{}' ({})", token, structure.name());
                let t = Traverser::new(coefficient, Value::Structure(token.clone()));
                Ok(Box::new(std::iter::once(Ok(t))))
            }
            InitialOp::Inject(values) => {
                let values = values.clone();
                Ok(Box::new(
                    values
                        .into_iter()
                        .map(move |v| Ok(Traverser::new(coefficient.clone(), v))),
                ))
            }
        }
    }
}

pub(crate) fn register<C: Coefficient>(registry: &mut Registry<C>) {
    registry.register("source", Capability::Initializing, Arity::exactly(1), |inst, ctx| {
        let (token, structure) = ctx.structure(inst, 0)?;
        Ok(Function::Initial(InitialFunction::new(
            ctx.header(inst),
            InitialOp::Source { token, structure },
        )))
    });
    registry.register("inject", Capability::Initializing, Arity::at_least(0), |inst, ctx| {
        let values = ctx.values_from(inst, 0)?;
        Ok(Function::Initial(InitialFunction::new(
            ctx.header(inst),
            InitialOp::Inject(values),
        )))
    });
}
