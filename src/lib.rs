//! # traversal-machine: bytecode-driven graph traversal
//!
//! A traversal is described as [`Bytecode`]: an ordered list of instructions,
//! each an opcode with arguments, an optional label and a coefficient. The
//! [`Compiler`] turns bytecode into a [`Pipeline`] of typed steps, and a
//! [`Processor`] runs the pipeline lazily over a stream of traversers.
//!
//! ## Architecture
//!
//! - **Coefficients**: semiring weights carried by every traverser
//! - **Bytecode**: serializable instruction lists, nested for branches
//! - **Pipeline**: compiled steps, one capability each, pulled lazily
//! - **Structure**: the graph or store the steps read from
//! - **Machine**: pipeline cache and threaded execution on top of it all
//!
//! ## Configuration
//!
//! Engine settings are read from `engine.toml` in the platform config
//! directory under `dev.traversal-machine`. See [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use traversal_machine::{
//!     Bytecode, Instruction, LongCoefficient, Machine, Compiler, Registry,
//!     structure::MemoryGraph,
//! };
//! use std::sync::Arc;
//!
//! let machine = Machine::<LongCoefficient>::new(Compiler::new(Registry::standard()))
//!     .with_default_structure(Arc::new(MemoryGraph::modern()));
//!
//! let code = Bytecode::new()
//!     .with(Instruction::new("inject").with_arg(1i64))
//!     .with(Instruction::new("V"))
//!     .with(Instruction::new("out").with_arg("knows"))
//!     .with(Instruction::new("count"));
//!
//! let results = machine.execute(&code, Vec::new())?;
//! ```

pub mod bytecode;
pub mod coefficient;
pub mod config;
pub mod error;
pub mod machine;
pub mod pipeline;
pub mod scripting;
pub mod structure;

// Re-export commonly used types
pub use bytecode::{Argument, Bytecode, Instruction, StructureToken, Value};
pub use coefficient::{Coefficient, LongCoefficient, RealCoefficient};
pub use config::EngineConfig;
pub use error::{MachineError, Result};
pub use machine::{Machine, TraversalHandle};
pub use pipeline::{
    Capability, CompileError, Compiler, ExecutionContext, Function, Pipeline, Processor, Registry,
    Traverser,
};
pub use structure::{Direction, Structure, StructureRegistry};
