//! Built-in step implementations, one module per capability.
//!
//! Each module defines its step struct plus a `register` function that
//! installs its opcodes into a [`Registry`](crate::pipeline::registry::Registry).

pub mod branch;
pub mod filter;
pub mod flat_map;
pub mod initial;
pub mod map;
pub mod reduce;

pub use branch::{BranchFunction, BranchRule};
pub use filter::{Compare, FilterFunction, FilterOp};
pub use flat_map::{FlatMapFunction, FlatMapOp};
pub use initial::{InitialFunction, InitialOp};
pub use map::{MapFunction, MapOp};
pub use reduce::{ReduceFunction, ReduceOp};

use crate::bytecode::Value;
use crate::error::Result;
use crate::scripting::{CompiledScript, ScriptEngine};
use std::fmt;
use std::sync::Arc;

/// A compiled script bound to the engine that evaluates it.
#[derive(Clone)]
pub struct Script {
    compiled: CompiledScript,
    engine: Arc<ScriptEngine>,
}

impl Script {
    pub fn new(compiled: CompiledScript, engine: Arc<ScriptEngine>) -> Self {
        Self { compiled, engine }
    }

    pub fn source(&self) -> &str {
        self.compiled.source()
    }

    pub fn eval(&self, input: &Value) -> Result<Value> {
        self.engine.eval(&self.compiled, input)
    }

    pub fn eval_predicate(&self, input: &Value) -> Result<bool> {
        self.engine.eval_predicate(&self.compiled, input)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Script").field(&self.source()).finish()
    }
}
