//! Bytecode: the serialized, language-agnostic form of a traversal.
//!
//! A [`Bytecode`] is an ordered list of [`Instruction`]s. Order defines
//! pipeline order. Instructions may nest further bytecode in their
//! arguments to express sub-traversals (branches, `where`).
//!
//! # Wire shape
//!
//! ```json
//! [
//!   { "opcode": "V", "coefficient": 1, "args": [] },
//!   { "opcode": "both", "label": "a", "coefficient": 1, "args": [] },
//!   { "opcode": "union", "coefficient": 1, "args": [
//!       { "kind": "bytecode", "value": [ { "opcode": "out", "coefficient": 1 } ] }
//!   ] }
//! ]
//! ```

mod instruction;
mod value;

pub use instruction::{Argument, Instruction};
pub(crate) use instruction::write_step;
pub use value::{StructureToken, Value};

use crate::coefficient::Coefficient;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered sequence of instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent, bound = "C: Coefficient")]
pub struct Bytecode<C: Coefficient> {
    instructions: Vec<Instruction<C>>,
}

impl<C: Coefficient> Bytecode<C> {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
        }
    }

    /// Append an instruction (builder style).
    pub fn with(mut self, instruction: Instruction<C>) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Append an identity-coefficient, unlabeled instruction.
    pub fn step<A: Into<Argument<C>>>(
        self,
        opcode: &str,
        args: impl IntoIterator<Item = A>,
    ) -> Self {
        self.with(Instruction::new(opcode).with_args(args))
    }

    pub fn push(&mut self, instruction: Instruction<C>) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[Instruction<C>] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// True if any instruction (at any nesting depth) carries a structure reference.
    pub fn has_structure_refs(&self) -> bool {
        self.instructions.iter().any(|inst| {
            inst.args().iter().any(|arg| match arg {
                Argument::Structure(_) => true,
                Argument::Bytecode(nested) => nested.has_structure_refs(),
                Argument::Value(_) => false,
            })
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<C: Coefficient> Default for Bytecode<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Coefficient> FromIterator<Instruction<C>> for Bytecode<C> {
    fn from_iter<I: IntoIterator<Item = Instruction<C>>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

impl<C: Coefficient> fmt::Display for Bytecode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, inst) in self.instructions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", inst)?;
        }
        write!(f, "]")
    }
}
