//! Opcode registry linking opcodes to step builders.
//!
//! The compiler looks every instruction up here: the [`OpcodeSpec`] declares
//! how many arguments the opcode accepts and which [`Capability`] its step
//! has, and carries the builder that turns the instruction into a
//! [`Function`]. Built-ins are installed by [`Registry::standard`]; callers
//! extend a registry with [`Registry::register`] to add plugin steps.

use crate::bytecode::{Argument, Instruction, StructureToken, Value};
use crate::coefficient::Coefficient;
use crate::config::StructureRefPolicy;
use crate::pipeline::compiled_plan::Pipeline;
use crate::pipeline::compiler::Compiler;
use crate::pipeline::error::{CompileError, CompileResult};
use crate::pipeline::function::{Capability, Function, StepHeader};
use crate::pipeline::functions::{self, Script};
use crate::structure::Structure;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Accepted argument count of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "exactly {}", max),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// Builds a step from an instruction whose arity was already checked.
pub type Builder<C> =
    Arc<dyn Fn(&Instruction<C>, &BuildContext<'_, C>) -> CompileResult<Function<C>> + Send + Sync>;

/// Metadata and builder for an opcode.
pub struct OpcodeSpec<C: Coefficient> {
    pub opcode: String,
    pub capability: Capability,
    pub arity: Arity,
    pub builder: Builder<C>,
}

impl<C: Coefficient> Clone for OpcodeSpec<C> {
    fn clone(&self) -> Self {
        Self {
            opcode: self.opcode.clone(),
            capability: self.capability,
            arity: self.arity,
            builder: Arc::clone(&self.builder),
        }
    }
}

impl<C: Coefficient> fmt::Debug for OpcodeSpec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeSpec")
            .field("opcode", &self.opcode)
            .field("capability", &self.capability)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Opcode table consulted by the compiler.
pub struct Registry<C: Coefficient> {
    specs: HashMap<String, OpcodeSpec<C>>,
}

impl<C: Coefficient> Registry<C> {
    /// A registry with no opcodes.
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// A registry holding every built-in step.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        functions::initial::register(&mut registry);
        functions::flat_map::register(&mut registry);
        functions::map::register(&mut registry);
        functions::filter::register(&mut registry);
        functions::branch::register(&mut registry);
        functions::reduce::register(&mut registry);
        registry
    }

    /// Install (or replace) an opcode.
    pub fn register<F>(&mut self, opcode: &str, capability: Capability, arity: Arity, builder: F)
    where
        F: Fn(&Instruction<C>, &BuildContext<'_, C>) -> CompileResult<Function<C>>
            + Send
            + Sync
            + 'static,
    {
        if self.specs.contains_key(opcode) {
            tracing::debug!("Replacing opcode '{}' in registry", opcode);
        }
        self.specs.insert(
            opcode.to_string(),
            OpcodeSpec {
                opcode: opcode.to_string(),
                capability,
                arity,
                builder: Arc::new(builder),
            },
        );
    }

    pub fn get(&self, opcode: &str) -> Option<&OpcodeSpec<C>> {
        self.specs.get(opcode)
    }

    pub fn contains(&self, opcode: &str) -> bool {
        self.specs.contains_key(opcode)
    }

    /// Registered opcodes, sorted.
    pub fn opcodes(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<C: Coefficient> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            specs: self.specs.clone(),
        }
    }
}

impl<C: Coefficient> Default for Registry<C> {
    fn default() -> Self {
        Self::standard()
    }
}

impl<C: Coefficient> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("opcodes", &self.opcodes())
            .finish()
    }
}

/// What a builder sees while turning one instruction into a step.
///
/// Argument accessors produce [`CompileError`]s that already carry the
/// opcode, the position and the argument index.
pub struct BuildContext<'c, C: Coefficient> {
    compiler: &'c Compiler<C>,
    opcode: &'c str,
    position: usize,
}

impl<'c, C: Coefficient> BuildContext<'c, C> {
    pub(crate) fn new(compiler: &'c Compiler<C>, opcode: &'c str, position: usize) -> Self {
        Self {
            compiler,
            opcode,
            position,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Header (structural identity) for the step built from `instruction`.
    pub fn header(&self, instruction: &Instruction<C>) -> StepHeader<C> {
        StepHeader::from_instruction(instruction)
    }

    fn arg<'i>(&self, instruction: &'i Instruction<C>, index: usize) -> CompileResult<&'i Argument<C>> {
        instruction.args().get(index).ok_or_else(|| CompileError::InvalidArgument {
            opcode: self.opcode.to_string(),
            position: self.position,
            index,
            reason: "missing".to_string(),
        })
    }

    fn type_error(&self, index: usize, expected: &'static str, found: String) -> CompileError {
        CompileError::ArgumentType {
            opcode: self.opcode.to_string(),
            position: self.position,
            index,
            expected,
            found,
        }
    }

    /// Reject an argument whose type is right but whose content is not.
    pub fn invalid(&self, index: usize, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidArgument {
            opcode: self.opcode.to_string(),
            position: self.position,
            index,
            reason: reason.into(),
        }
    }

    pub fn value<'i>(&self, instruction: &'i Instruction<C>, index: usize) -> CompileResult<&'i Value> {
        match self.arg(instruction, index)? {
            Argument::Value(v) => Ok(v),
            other => Err(self.type_error(index, "a value", other.kind_name().to_string())),
        }
    }

    pub fn string(&self, instruction: &Instruction<C>, index: usize) -> CompileResult<String> {
        match self.value(instruction, index)? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(self.type_error(index, "a string", other.type_name().to_string())),
        }
    }

    pub fn int(&self, instruction: &Instruction<C>, index: usize) -> CompileResult<i64> {
        match self.value(instruction, index)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.type_error(index, "an integer", other.type_name().to_string())),
        }
    }

    /// Every argument from `start` on, each required to be a string.
    pub fn strings_from(&self, instruction: &Instruction<C>, start: usize) -> CompileResult<Vec<String>> {
        (start..instruction.args().len())
            .map(|i| self.string(instruction, i))
            .collect()
    }

    /// Every argument from `start` on, each required to be a value.
    pub fn values_from(&self, instruction: &Instruction<C>, start: usize) -> CompileResult<Vec<Value>> {
        (start..instruction.args().len())
            .map(|i| self.value(instruction, i).cloned())
            .collect()
    }

    /// Compile a nested bytecode argument into its own pipeline.
    pub fn pipeline(&self, instruction: &Instruction<C>, index: usize) -> CompileResult<Pipeline<C>> {
        match self.arg(instruction, index)? {
            Argument::Bytecode(code) => {
                self.compiler
                    .compile_nested(code)
                    .map_err(|e| CompileError::Nested {
                        opcode: self.opcode.to_string(),
                        position: self.position,
                        index,
                        source: Box::new(e),
                    })
            }
            other => Err(self.type_error(index, "bytecode", other.kind_name().to_string())),
        }
    }

    /// Compile every argument from `start` on as nested bytecode.
    pub fn pipelines_from(&self, instruction: &Instruction<C>, start: usize) -> CompileResult<Vec<Pipeline<C>>> {
        (start..instruction.args().len())
            .map(|i| self.pipeline(instruction, i))
            .collect()
    }

    /// Resolve a structure reference argument to a live handle.
    pub fn structure(
        &self,
        instruction: &Instruction<C>,
        index: usize,
    ) -> CompileResult<(StructureToken, Arc<dyn Structure>)> {
        let token = match self.arg(instruction, index)? {
            Argument::Structure(token) => token,
            other => {
                return Err(self.type_error(index, "a structure reference", other.kind_name().to_string()))
            }
        };
        if self.compiler.policy() == StructureRefPolicy::Reject {
            return Err(CompileError::StructureRefRejected {
                opcode: self.opcode.to_string(),
                position: self.position,
            });
        }
        self.compiler
            .structures()
            .resolve(token)
            .map(|handle| (token.clone(), handle))
            .ok_or_else(|| CompileError::UnresolvedStructure {
                opcode: self.opcode.to_string(),
                position: self.position,
                token: token.to_string(),
            })
    }

    /// Like [`structure`](Self::structure), but `None` when the argument is absent.
    pub fn optional_structure(
        &self,
        instruction: &Instruction<C>,
        index: usize,
    ) -> CompileResult<Option<Arc<dyn Structure>>> {
        if instruction.args().len() <= index {
            return Ok(None);
        }
        self.structure(instruction, index).map(|(_, handle)| Some(handle))
    }

    /// Compile a script argument with the compiler's script engine.
    pub fn script(&self, instruction: &Instruction<C>, index: usize) -> CompileResult<Script> {
        let source = self.string(instruction, index)?;
        let engine = self.compiler.script_engine();
        let compiled = engine
            .compile(&source)
            .map_err(|e| self.invalid(index, e.to_string()))?;
        Ok(Script::new(compiled, engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficient::LongCoefficient;

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::exactly(1).accepts(1));
        assert!(!Arity::exactly(1).accepts(0));
        assert!(Arity::range(0, 1).accepts(0));
        assert!(!Arity::range(0, 1).accepts(2));
        assert!(Arity::at_least(0).accepts(17));
    }

    #[test]
    fn test_arity_display() {
        assert_eq!(Arity::exactly(2).to_string(), "exactly 2");
        assert_eq!(Arity::range(1, 2).to_string(), "1 to 2");
        assert_eq!(Arity::at_least(1).to_string(), "at least 1");
    }

    #[test]
    fn test_standard_registry_covers_builtins() {
        let registry = Registry::<LongCoefficient>::standard();
        for opcode in [
            "source", "inject", "V", "out", "in", "both", "values", "unfold", "identity",
            "constant", "incr", "id", "select", "path", "map", "is", "has", "filter", "where",
            "limit", "dedup", "union", "coalesce", "count", "sum", "group_count", "barrier",
        ] {
            assert!(registry.contains(opcode), "missing {}", opcode);
        }
        assert_eq!(registry.get("count").unwrap().capability, Capability::Reduce);
        assert_eq!(registry.get("source").unwrap().capability, Capability::Initializing);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = Registry::<LongCoefficient>::empty();
        registry.register("noop", Capability::Map, Arity::exactly(0), |inst, ctx| {
            Ok(Function::Map(functions::MapFunction::new(
                ctx.header(inst),
                functions::MapOp::Identity,
            )))
        });
        registry.register("noop", Capability::Map, Arity::exactly(1), |inst, ctx| {
            Ok(Function::Map(functions::MapFunction::new(
                ctx.header(inst),
                functions::MapOp::Identity,
            )))
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("noop").unwrap().arity, Arity::exactly(1));
    }
}
