//! Compile-time error types.
//!
//! Every variant names the offending opcode and its position in the
//! bytecode (0-based, relative to the bytecode being compiled). Failures
//! inside nested bytecode are wrapped in [`CompileError::Nested`].

use crate::pipeline::function::Capability;
use crate::pipeline::registry::Arity;
use thiserror::Error;

/// Errors that can occur while compiling bytecode into a pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("step {position}: unknown opcode `{opcode}`")]
    UnknownOpcode { opcode: String, position: usize },

    #[error("step {position} (`{opcode}`): expected {expected} argument(s), found {found}")]
    Arity {
        opcode: String,
        position: usize,
        expected: Arity,
        found: usize,
    },

    #[error("step {position} (`{opcode}`): argument {index} must be {expected}, found {found}")]
    ArgumentType {
        opcode: String,
        position: usize,
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("step {position} (`{opcode}`): argument {index} is invalid: {reason}")]
    InvalidArgument {
        opcode: String,
        position: usize,
        index: usize,
        reason: String,
    },

    #[error("step {position} (`{opcode}`): structure `{token}` is not registered")]
    UnresolvedStructure {
        opcode: String,
        position: usize,
        token: String,
    },

    #[error("step {position} (`{opcode}`): bytecode must not carry structure references")]
    StructureRefRejected { opcode: String, position: usize },

    #[error("step {position} (`{opcode}`): in nested bytecode argument {index}: {source}")]
    Nested {
        opcode: String,
        position: usize,
        index: usize,
        #[source]
        source: Box<CompileError>,
    },

    #[error("step {position} (`{opcode}`): built a {found} step, registry declares {expected}")]
    Capability {
        opcode: String,
        position: usize,
        expected: Capability,
        found: Capability,
    },
}

impl CompileError {
    /// Opcode of the instruction that failed.
    pub fn opcode(&self) -> &str {
        match self {
            CompileError::UnknownOpcode { opcode, .. }
            | CompileError::Arity { opcode, .. }
            | CompileError::ArgumentType { opcode, .. }
            | CompileError::InvalidArgument { opcode, .. }
            | CompileError::UnresolvedStructure { opcode, .. }
            | CompileError::StructureRefRejected { opcode, .. }
            | CompileError::Nested { opcode, .. }
            | CompileError::Capability { opcode, .. } => opcode,
        }
    }

    /// Position of the failing instruction in its bytecode.
    pub fn position(&self) -> usize {
        match self {
            CompileError::UnknownOpcode { position, .. }
            | CompileError::Arity { position, .. }
            | CompileError::ArgumentType { position, .. }
            | CompileError::InvalidArgument { position, .. }
            | CompileError::UnresolvedStructure { position, .. }
            | CompileError::StructureRefRejected { position, .. }
            | CompileError::Nested { position, .. }
            | CompileError::Capability { position, .. } => *position,
        }
    }

    /// The innermost error, following nested bytecode.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::Nested { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;
