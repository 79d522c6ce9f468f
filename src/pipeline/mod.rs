//! Step-based traversal pipelines.
//!
//! Bytecode is compiled into a [`Pipeline`] of typed steps. Traversers flow
//! through the steps lazily: a [`Processor`] pulls from the last step, which
//! pulls from the one before it, down to the seeds.
//!
//! # Architecture
//!
//! ```text
//! Bytecode ──► Compiler ──► Pipeline ──► Processor ──► results
//!                 ▲                         ▲
//!              Registry              ExecutionContext
//! ```
//!
//! # Design
//!
//! - **Enum dispatch on hot path**: `Function` is a closed enum over the
//!   built-in step kinds; user steps go through the `Plugin` variant.
//! - **Capability-typed steps**: every opcode declares one capability
//!   (initializing, flat-map, map, filter, branch, reduce) and the compiler
//!   rejects builders that return anything else.
//! - **Structural identity**: pipelines compare and hash by opcode, label,
//!   coefficient and arguments, so they can key caches.
//! - **Duplicate per execution**: step state never crosses executions.

pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod function;
pub mod functions;
pub mod processor;
pub mod registry;
pub mod traverser;

pub use compiled_plan::{Pipeline, PlanStats};
pub use compiler::{compile, Compiler};
pub use error::{CompileError, CompileResult};
pub use function::{Capability, Function, FunctionPlugin, StepHeader, TraverserIter};
pub use processor::{ExecutionContext, Processor};
pub use registry::{Arity, BuildContext, OpcodeSpec, Registry};
pub use traverser::{Path, PathEntry, Traverser};
