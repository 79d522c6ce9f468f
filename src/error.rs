//! Error handling for the traversal machine
//!
//! This module defines the crate-wide error type and a Result alias. Compile
//! failures have their own type in [`crate::pipeline::error`] and convert into
//! [`MachineError::Compile`] when they cross into execution APIs.

use crate::pipeline::error::CompileError;
use thiserror::Error;

/// Main error type for traversal machine operations
#[derive(Error, Debug)]
pub enum MachineError {
    /// Bytecode failed to compile; no pipeline was produced
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A step failed while processing a traverser
    #[error("Execution failure in step `{step}`: {message}")]
    Execution { step: String, message: String },

    /// The backing structure reported a failure
    #[error("Structure error: {0}")]
    Structure(String),

    /// Errors related to Rhai script compilation or evaluation
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A caller-imposed wait for results expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The execution thread went away without finishing its stream
    #[error("Execution disconnected: {0}")]
    Disconnected(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MachineError>,
    },
}

impl MachineError {
    /// Build an execution failure attributed to a step
    pub fn execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        MachineError::Execution {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MachineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        MachineError::Script(err.to_string())
    }

    /// True when the error aborted a running execution (as opposed to a
    /// failure that happened before any traverser was pulled).
    pub fn is_execution_failure(&self) -> bool {
        match self {
            MachineError::Execution { .. } | MachineError::Structure(_) | MachineError::Script(_) => {
                true
            }
            MachineError::WithContext { source, .. } => source.is_execution_failure(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for MachineError {
    fn from(err: serde_json::Error) -> Self {
        MachineError::Serialization(err.to_string())
    }
}

/// Result type alias for traversal machine operations
pub type Result<T> = std::result::Result<T, MachineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| MachineError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| MachineError::from_rhai_error(e).with_context(f()))
    }
}
