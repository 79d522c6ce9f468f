//! Backing structures (graphs, databases) that source steps read from.
//!
//! Structures are owned by the caller and shared with pipelines through
//! `Arc<dyn Structure>`. Duplicating a pipeline clones the `Arc`, never the
//! structure. Implementations must tolerate concurrent reads from independent
//! executions; the engine takes no locks around them.
//!
//! Bytecode refers to structures only through serializable
//! [`StructureToken`]s, which the compiler resolves against a
//! [`StructureRegistry`].

mod memory;

pub use memory::{MemoryGraph, MemoryGraphBuilder};

use crate::bytecode::{StructureToken, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Edge direction for adjacency lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn opcode(self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode())
    }
}

/// Lazy sequence of elements read from a structure.
///
/// Owns whatever it reads from, so it can outlive the call that made it.
pub type ValueIter = Box<dyn Iterator<Item = Value> + Send>;

/// Read interface of a backing structure.
#[cfg_attr(test, mockall::automock)]
pub trait Structure: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Every vertex, in a stable order.
    fn vertices(&self) -> Result<ValueIter>;

    /// Vertices adjacent to `vertex` in `direction`. An empty `labels` slice
    /// matches every edge label.
    fn adjacent(&self, vertex: &Value, direction: Direction, labels: &[String])
        -> Result<ValueIter>;

    /// Property lookup on an element; `None` when the key is absent.
    fn property(&self, element: &Value, key: &str) -> Result<Option<Value>>;
}

/// Side-table mapping bytecode structure tokens to live handles.
#[derive(Clone, Default)]
pub struct StructureRegistry {
    entries: HashMap<StructureToken, Arc<dyn Structure>>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a structure under a token, replacing any previous entry.
    pub fn register(&mut self, token: impl Into<String>, structure: Arc<dyn Structure>) {
        let token = StructureToken::new(token);
        tracing::debug!("Registered structure '{}' as {}", structure.name(), token);
        self.entries.insert(token, structure);
    }

    pub fn resolve(&self, token: &StructureToken) -> Option<Arc<dyn Structure>> {
        self.entries.get(token).cloned()
    }

    pub fn contains(&self, token: &StructureToken) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for StructureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<_> = self.entries.keys().map(|t| t.as_str()).collect();
        tokens.sort_unstable();
        f.debug_struct("StructureRegistry")
            .field("tokens", &tokens)
            .finish()
    }
}
