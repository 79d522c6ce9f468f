use super::compiled_plan::Pipeline;
use super::error::{CompileError, CompileResult};
use super::registry::{BuildContext, Registry};
use crate::bytecode::{Argument, Bytecode};
use crate::coefficient::Coefficient;
use crate::config::{EngineConfig, StructureRefPolicy};
use crate::scripting::ScriptEngine;
use crate::structure::StructureRegistry;
use std::sync::Arc;

/// Compiles bytecode into executable pipelines
///
/// Compilation is deterministic: the same bytecode against the same registry
/// yields structurally equal pipelines. The compiler itself holds no
/// per-compilation state and may be shared between threads.
pub struct Compiler<C: Coefficient> {
    registry: Registry<C>,
    structures: StructureRegistry,
    policy: StructureRefPolicy,
    scripts: Arc<ScriptEngine>,
}

impl<C: Coefficient> Compiler<C> {
    /// Compiler with no registered structures and a default script engine
    pub fn new(registry: Registry<C>) -> Self {
        Self {
            registry,
            structures: StructureRegistry::new(),
            policy: StructureRefPolicy::default(),
            scripts: Arc::new(ScriptEngine::new()),
        }
    }

    /// Compiler configured from an engine config
    pub fn from_config(config: &EngineConfig, registry: Registry<C>, structures: StructureRegistry) -> Self {
        Self {
            registry,
            structures,
            policy: config.compiler.structure_refs,
            scripts: Arc::new(ScriptEngine::with_limits(&config.scripting)),
        }
    }

    pub fn with_structures(mut self, structures: StructureRegistry) -> Self {
        self.structures = structures;
        self
    }

    pub fn with_policy(mut self, policy: StructureRefPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_script_engine(mut self, scripts: Arc<ScriptEngine>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    pub fn structures(&self) -> &StructureRegistry {
        &self.structures
    }

    pub fn policy(&self) -> StructureRefPolicy {
        self.policy
    }

    pub fn script_engine(&self) -> Arc<ScriptEngine> {
        Arc::clone(&self.scripts)
    }

    /// Compile bytecode into a pipeline.
    ///
    /// Every instruction is checked in order: the opcode must be registered,
    /// its argument count must match the declared arity, structure references
    /// must be allowed and resolvable, and the built step must have the
    /// capability the registry declares. The first violation aborts the
    /// compilation; no partial pipeline is returned.
    pub fn compile(&self, bytecode: &Bytecode<C>) -> CompileResult<Pipeline<C>> {
        let pipeline = self.compile_nested(bytecode)?;
        tracing::info!(
            "Compiled {} step(s) in {}us: {}",
            pipeline.len(),
            pipeline.stats().compile_time_us,
            pipeline
        );
        Ok(pipeline)
    }

    pub(crate) fn compile_nested(&self, bytecode: &Bytecode<C>) -> CompileResult<Pipeline<C>> {
        let start_time = std::time::Instant::now();
        let mut steps = Vec::with_capacity(bytecode.len());

        for (position, instruction) in bytecode.instructions().iter().enumerate() {
            let opcode = instruction.opcode();
            let spec = self
                .registry
                .get(opcode)
                .ok_or_else(|| CompileError::UnknownOpcode {
                    opcode: opcode.to_string(),
                    position,
                })?;

            let found = instruction.args().len();
            if !spec.arity.accepts(found) {
                return Err(CompileError::Arity {
                    opcode: opcode.to_string(),
                    position,
                    expected: spec.arity,
                    found,
                });
            }

            if self.policy == StructureRefPolicy::Reject
                && instruction
                    .args()
                    .iter()
                    .any(|arg| matches!(arg, Argument::Structure(_)))
            {
                return Err(CompileError::StructureRefRejected {
                    opcode: opcode.to_string(),
                    position,
                });
            }

            let ctx = BuildContext::new(self, opcode, position);
            let function = (spec.builder)(instruction, &ctx)?;

            if function.capability() != spec.capability {
                return Err(CompileError::Capability {
                    opcode: opcode.to_string(),
                    position,
                    expected: spec.capability,
                    found: function.capability(),
                });
            }
            steps.push(function);
        }

        let compile_time_us = start_time.elapsed().as_micros() as u64;
        Ok(Pipeline::new(steps, compile_time_us))
    }
}

impl<C: Coefficient> std::fmt::Debug for Compiler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("registry", &self.registry)
            .field("structures", &self.structures)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Compile with a registry and no structure side-table
pub fn compile<C: Coefficient>(bytecode: &Bytecode<C>, registry: &Registry<C>) -> CompileResult<Pipeline<C>> {
    Compiler::new(registry.clone()).compile(bytecode)
}
