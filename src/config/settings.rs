//! Engine settings sections
//!
//! Each section deserializes with defaults for every missing field, so a
//! partial `engine.toml` is always valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wait for a single result from a spawned traversal
pub const DEFAULT_RESULT_TIMEOUT_MS: u64 = 30_000;

/// Default number of compiled pipelines a machine keeps
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default bounded channel capacity between worker and consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How the compiler treats structure references embedded in bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureRefPolicy {
    /// Resolve tokens against the compiler's structure registry
    #[default]
    Resolve,
    /// Reject bytecode carrying tokens; structures come from the execution context
    Reject,
}

/// Compiler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Structure reference handling
    pub structure_refs: StructureRefPolicy,

    /// Keep compiled pipelines keyed by bytecode and hand out duplicates
    pub cache_pipelines: bool,

    /// Most pipelines kept; the oldest entry is evicted first
    pub cache_capacity: usize,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            structure_refs: StructureRefPolicy::Resolve,
            cache_pipelines: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Record every step in traverser paths, not just labeled ones
    pub track_paths: bool,

    /// How long a consumer waits for the next result of a spawned traversal
    pub result_timeout_ms: u64,

    /// Capacity of the worker-to-consumer channel
    pub channel_capacity: usize,
}

impl ExecutionSettings {
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            track_paths: false,
            result_timeout_ms: DEFAULT_RESULT_TIMEOUT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Safety limits applied to the script engine used by `map`/`filter` steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 10_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 10_000,
            max_array_size: 1_000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
