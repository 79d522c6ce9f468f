//! Rhai scripting for `map` and `filter` steps
//!
//! A script step carries a Rhai expression that sees the current traverser
//! value as `it` (also bound as `value`). `map` scripts return the new value;
//! `filter` scripts return a boolean.
//!
//! ## Value Mapping
//!
//! | Traverser value | Rhai value                      |
//! |-----------------|---------------------------------|
//! | null            | `()`                            |
//! | bool/int/float  | `bool`/`i64`/`f64`              |
//! | string          | `String`                        |
//! | list            | `Array`                         |
//! | map             | object map (keys stringified)   |
//! | vertex          | `Vertex` (read `.id`)           |
//! | structure token | `String`                        |
//!
//! ## Example Scripts
//!
//! Doubling a number:
//! ```rhai
//! it * 2
//! ```
//!
//! Keeping adults:
//! ```rhai
//! it.age >= 30
//! ```

mod engine;

pub use engine::ScriptEngine;

use crate::bytecode::Value;
use crate::error::{MachineError, Result};
use rhai::{Dynamic, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Opaque vertex handle exposed to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexRef(pub i64);

/// A compiled step script
#[derive(Clone)]
pub struct CompiledScript {
    ast: AST,
    source: String,
}

impl CompiledScript {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("source", &self.source)
            .finish()
    }
}

/// Cache for compiled scripts, keyed by source
#[derive(Default)]
pub struct ScriptCache {
    cache: HashMap<String, CompiledScript>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached script or compile and cache it
    pub fn get_or_compile(&mut self, engine: &rhai::Engine, source: &str) -> Result<CompiledScript> {
        if let Some(script) = self.cache.get(source) {
            return Ok(script.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| MachineError::Script(format!("Compilation error: {}", e)))?;

        let script = CompiledScript {
            ast,
            source: source.to_string(),
        };
        self.cache.insert(source.to_string(), script.clone());
        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;

/// Convert a traverser value into a Rhai value
pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Int(i) => Dynamic::from(*i),
        Value::Float(x) => Dynamic::from(*x),
        Value::Str(s) => Dynamic::from(s.clone()),
        Value::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::Map(entries) => {
            let mut map = rhai::Map::new();
            for (k, v) in entries {
                let key = match k {
                    Value::Str(s) => s.clone(),
                    other => other.to_string(),
                };
                map.insert(key.into(), to_dynamic(v));
            }
            Dynamic::from_map(map)
        }
        Value::Vertex(id) => Dynamic::from(VertexRef(*id)),
        Value::Structure(token) => Dynamic::from(token.as_str().to_string()),
    }
}

/// Convert a Rhai result back into a traverser value
pub fn from_dynamic(value: Dynamic) -> Result<Value> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::Int(i));
    }
    if let Ok(x) = value.as_float() {
        return Ok(Value::Float(x));
    }
    if value.is_string() {
        return value
            .into_string()
            .map(Value::Str)
            .map_err(|t| MachineError::Script(format!("Unreadable string of type {}", t)));
    }
    if value.is_array() {
        let items = value
            .into_array()
            .map_err(|t| MachineError::Script(format!("Unreadable array of type {}", t)))?;
        return Ok(Value::List(
            items.into_iter().map(from_dynamic).collect::<Result<_>>()?,
        ));
    }
    if value.is::<VertexRef>() {
        let type_name = value.type_name();
        return value
            .try_cast::<VertexRef>()
            .map(|v| Value::Vertex(v.0))
            .ok_or_else(|| MachineError::Script(format!("Unreadable vertex of type {}", type_name)));
    }
    let type_name = value.type_name().to_string();
    if let Some(map) = value.try_cast::<rhai::Map>() {
        let entries = map
            .into_iter()
            .map(|(k, v)| Ok((Value::Str(k.to_string()), from_dynamic(v)?)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::map(entries));
    }
    Err(MachineError::Script(format!(
        "Script returned unsupported type {}",
        type_name
    )))
}
