//! Compile-once, execute-many front end.
//!
//! [`Machine`] owns a [`Compiler`] and a cache of compiled pipelines keyed by
//! structural bytecode equality. Every execution runs on its own duplicate
//! of the cached pipeline, so any number of executions may run at once
//! without sharing step state. The cache holds at most
//! `compiler.cache_capacity` pipelines and evicts the oldest entry first.
//!
//! Executions can run on the caller's thread ([`Machine::execute`]) or on a
//! worker thread ([`Machine::spawn`]) that streams results over a bounded
//! crossbeam channel. Dropping the [`TraversalHandle`] cancels the worker at
//! its next send.

use crate::bytecode::{Bytecode, Value};
use crate::coefficient::Coefficient;
use crate::config::{CompilerSettings, EngineConfig, ExecutionSettings};
use crate::error::{MachineError, Result};
use crate::pipeline::compiled_plan::Pipeline;
use crate::pipeline::compiler::Compiler;
use crate::pipeline::error::CompileResult;
use crate::pipeline::processor::ExecutionContext;
use crate::pipeline::registry::Registry;
use crate::pipeline::traverser::Traverser;
use crate::structure::{Structure, StructureRegistry};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Messages sent from a traversal worker to its handle
#[derive(Debug)]
pub enum TraversalMessage<C: Coefficient> {
    /// One result traverser
    Traverser(Traverser<C>),
    /// The execution aborted; no further messages follow
    Failed(MachineError),
    /// The execution finished normally
    Done,
}

/// Compiled pipelines in insertion order, bounded by `capacity`
struct PipelineCache<C: Coefficient> {
    entries: HashMap<Bytecode<C>, Pipeline<C>>,
    order: VecDeque<Bytecode<C>>,
    capacity: usize,
}

impl<C: Coefficient> PipelineCache<C> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, bytecode: &Bytecode<C>) -> Option<&Pipeline<C>> {
        self.entries.get(bytecode)
    }

    fn insert(&mut self, bytecode: Bytecode<C>, pipeline: Pipeline<C>) {
        if self.capacity == 0 || self.entries.contains_key(&bytecode) {
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            tracing::debug!("Evicting cached pipeline: {}", oldest);
            self.entries.remove(&oldest);
        }
        self.order.push_back(bytecode.clone());
        self.entries.insert(bytecode, pipeline);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

pub struct Machine<C: Coefficient> {
    compiler: Compiler<C>,
    cache: RwLock<PipelineCache<C>>,
    cache_enabled: bool,
    settings: ExecutionSettings,
    default_structure: Option<Arc<dyn Structure>>,
}

impl<C: Coefficient> Machine<C> {
    pub fn new(compiler: Compiler<C>) -> Self {
        let defaults = CompilerSettings::default();
        Self {
            compiler,
            cache: RwLock::new(PipelineCache::new(defaults.cache_capacity)),
            cache_enabled: defaults.cache_pipelines,
            settings: ExecutionSettings::default(),
            default_structure: None,
        }
    }

    /// Machine whose compiler, cache and executions follow `config`
    pub fn from_config(config: &EngineConfig, registry: Registry<C>, structures: StructureRegistry) -> Self {
        Self {
            compiler: Compiler::from_config(config, registry, structures),
            cache: RwLock::new(PipelineCache::new(config.compiler.cache_capacity)),
            cache_enabled: config.compiler.cache_pipelines,
            settings: config.execution.clone(),
            default_structure: None,
        }
    }

    /// Structure used by steps that name none
    pub fn with_default_structure(mut self, structure: Arc<dyn Structure>) -> Self {
        self.default_structure = Some(structure);
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn compiler(&self) -> &Compiler<C> {
        &self.compiler
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Context for a fresh execution
    pub fn context(&self) -> ExecutionContext {
        let mut ctx = ExecutionContext::from_settings(&self.settings)
            .with_structures(self.compiler.structures().clone());
        if let Some(structure) = &self.default_structure {
            ctx = ctx.with_structure(Arc::clone(structure));
        }
        ctx
    }

    /// A pipeline ready for one execution.
    ///
    /// The returned pipeline is always a fresh duplicate; the cached copy is
    /// never executed.
    pub fn prepare(&self, bytecode: &Bytecode<C>) -> CompileResult<Pipeline<C>> {
        if !self.cache_enabled {
            return self.compiler.compile(bytecode);
        }

        if let Ok(cache) = self.cache.read() {
            if let Some(pipeline) = cache.get(bytecode) {
                tracing::debug!("Pipeline cache hit: {}", bytecode);
                return Ok(pipeline.duplicate());
            }
        }

        let pipeline = self.compiler.compile(bytecode)?;
        match self.cache.write() {
            Ok(mut cache) => cache.insert(bytecode.clone(), pipeline.duplicate()),
            Err(e) => tracing::warn!("Pipeline cache unavailable: {}", e),
        }
        Ok(pipeline)
    }

    /// Compile (or fetch) and run to completion on the calling thread
    pub fn execute(&self, bytecode: &Bytecode<C>, seeds: Vec<Value>) -> Result<Vec<Traverser<C>>> {
        let mut pipeline = self.prepare(bytecode)?;
        let ctx = self.context();
        pipeline.execute(seeds, &ctx).collect()
    }

    /// Run on a worker thread, streaming results to the returned handle
    pub fn spawn(&self, bytecode: &Bytecode<C>, seeds: Vec<Value>) -> Result<TraversalHandle<C>> {
        let mut pipeline = self.prepare(bytecode)?;
        let ctx = self.context();
        let (tx, rx) = bounded(self.settings.channel_capacity.max(1));

        let worker = std::thread::Builder::new()
            .name("traversal-worker".to_string())
            .spawn(move || {
                for result in pipeline.execute(seeds, &ctx) {
                    let message = match result {
                        Ok(t) => TraversalMessage::Traverser(t),
                        Err(e) => TraversalMessage::Failed(e),
                    };
                    let failed = matches!(message, TraversalMessage::Failed(_));
                    if tx.send(message).is_err() {
                        tracing::debug!("Traversal handle dropped, stopping worker");
                        return;
                    }
                    if failed {
                        return;
                    }
                }
                let _ = tx.send(TraversalMessage::Done);
            })?;

        Ok(TraversalHandle {
            rx: Some(rx),
            worker: Some(worker),
            timeout: self.settings.result_timeout(),
            finished: false,
        })
    }

    pub fn cached_pipelines(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

impl<C: Coefficient> std::fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("compiler", &self.compiler)
            .field("cached_pipelines", &self.cached_pipelines())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Consumer side of a spawned traversal
pub struct TraversalHandle<C: Coefficient> {
    rx: Option<Receiver<TraversalMessage<C>>>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
    finished: bool,
}

impl<C: Coefficient> TraversalHandle<C> {
    /// Wait up to `timeout` for the next result.
    ///
    /// `Ok(None)` means the traversal finished. A failure is returned once;
    /// the handle is finished afterwards.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<Option<Traverser<C>>> {
        if self.finished {
            return Ok(None);
        }
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv_timeout(timeout) {
            Ok(TraversalMessage::Traverser(t)) => Ok(Some(t)),
            Ok(TraversalMessage::Failed(e)) => {
                self.finish();
                Err(e)
            }
            Ok(TraversalMessage::Done) => {
                self.finish();
                Ok(None)
            }
            Err(RecvTimeoutError::Timeout) => Err(MachineError::Timeout(format!(
                "no result within {}ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                self.finish();
                Err(MachineError::Disconnected(
                    "worker exited before finishing".to_string(),
                ))
            }
        }
    }

    /// Next result using the configured timeout
    pub fn next_result(&mut self) -> Result<Option<Traverser<C>>> {
        self.next_timeout(self.timeout)
    }

    /// Drain every remaining result, each wait bounded by the configured timeout
    pub fn collect_all(mut self) -> Result<Vec<Traverser<C>>> {
        let mut out = Vec::new();
        while let Some(t) = self.next_result()? {
            out.push(t);
        }
        Ok(out)
    }

    /// Stop consuming. The worker exits at its next send.
    pub fn cancel(mut self) {
        tracing::debug!("Cancelling traversal");
        self.rx = None;
        self.worker = None;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Traversal worker panicked");
            }
        }
    }
}

impl<C: Coefficient> Iterator for TraversalHandle<C> {
    type Item = Result<Traverser<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_result().transpose()
    }
}
