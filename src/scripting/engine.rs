//! Rhai Script Engine Implementation
//!
//! Scripts are evaluated as expressions with `it` and `value` bound to the
//! current traverser value. If the script defines `fn step(it)`, that
//! function is called instead.
//!
//! ## Helper Functions
//!
//! - `id(vertex)` - Numeric id of a vertex
//! - `abs`, `sqrt`, `pow`, `floor`, `ceil`, `round`, `clamp`, `min`, `max`
//! - `to_int(x)`, `to_float(i)`

use crate::bytecode::Value;
use crate::config::ScriptLimits;
use crate::error::{MachineError, Result};
use crate::scripting::{from_dynamic, to_dynamic, CompiledScript, ScriptCache, SharedScriptCache, VertexRef};
use rhai::{Dynamic, Engine, Scope};
use std::sync::{Arc, RwLock};

/// Entry point looked up before falling back to expression evaluation
const STEP_FN: &str = "step";

/// The script engine shared by every script step of a compiler
pub struct ScriptEngine {
    engine: Engine,
    cache: SharedScriptCache,
}

impl ScriptEngine {
    /// Create a new script engine with default limits
    pub fn new() -> Self {
        Self::with_limits(&ScriptLimits::default())
    }

    /// Create a script engine with explicit safety limits
    pub fn with_limits(limits: &ScriptLimits) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, limits);
        Self {
            engine,
            cache: Arc::new(RwLock::new(ScriptCache::new())),
        }
    }

    fn configure_engine(engine: &mut Engine, limits: &ScriptLimits) {
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_operations(limits.max_operations);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_array_size);

        engine
            .register_type_with_name::<VertexRef>("Vertex")
            .register_get("id", |v: &mut VertexRef| v.0)
            .register_fn("to_string", |v: &mut VertexRef| format!("v[{}]", v.0));
        engine.register_fn("id", |v: VertexRef| v.0);

        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("abs", |x: i64| x.saturating_abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("floor", |x: f64| x.floor());
        engine.register_fn("ceil", |x: f64| x.ceil());
        engine.register_fn("round", |x: f64| x.round());
        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));
        engine.register_fn("clamp", |x: i64, min: i64, max: i64| x.clamp(min, max));
        engine.register_fn("min", |a: f64, b: f64| a.min(b));
        engine.register_fn("max", |a: f64, b: f64| a.max(b));
        engine.register_fn("min", |a: i64, b: i64| a.min(b));
        engine.register_fn("max", |a: i64, b: i64| a.max(b));
        engine.register_fn("to_int", |x: f64| x as i64);
        engine.register_fn("to_float", |x: i64| x as f64);
    }

    /// Compile a script and cache it
    pub fn compile(&self, source: &str) -> Result<CompiledScript> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| MachineError::Script(format!("Failed to acquire cache lock: {}", e)))?;
        cache.get_or_compile(&self.engine, source)
    }

    /// Evaluate a script against a traverser value
    pub fn eval(&self, script: &CompiledScript, input: &Value) -> Result<Value> {
        let it = to_dynamic(input);
        let mut scope = Scope::new();
        scope.push("it", it.clone());
        scope.push("value", it.clone());

        let has_step_fn = script
            .ast()
            .iter_functions()
            .any(|f| f.name == STEP_FN && f.params.len() == 1);

        let result = if has_step_fn {
            self.engine
                .call_fn::<Dynamic>(&mut scope, script.ast(), STEP_FN, (it,))
        } else {
            self.engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, script.ast())
        };

        let result = result.map_err(|e| MachineError::Script(format!("Execution error: {}", e)))?;
        from_dynamic(result)
    }

    /// Evaluate a script that must yield a boolean
    pub fn eval_predicate(&self, script: &CompiledScript, input: &Value) -> Result<bool> {
        match self.eval(script, input)? {
            Value::Bool(b) => Ok(b),
            other => Err(MachineError::Script(format!(
                "Filter script must return a bool, got {}",
                other.type_name()
            ))),
        }
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| MachineError::Script(format!("Validation error: {}", e)))
    }

    /// Number of distinct compiled scripts held in the cache
    pub fn cached_scripts(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cached_scripts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, input: Value) -> Result<Value> {
        let engine = ScriptEngine::new();
        let script = engine.compile(source)?;
        engine.eval(&script, &input)
    }

    #[test]
    fn test_expression_sees_it() {
        assert_eq!(eval("it * 2", Value::Int(21)).unwrap(), Value::Int(42));
        assert_eq!(eval("value + 0.5", Value::Float(1.0)).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_step_function_preferred() {
        let script = r#"
fn step(x) {
    x + 100
}
"#;
        assert_eq!(eval(script, Value::Int(1)).unwrap(), Value::Int(101));
    }

    #[test]
    fn test_vertex_id_access() {
        assert_eq!(eval("it.id", Value::Vertex(4)).unwrap(), Value::Int(4));
        assert_eq!(eval("id(it) > 3", Value::Vertex(4)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_map_property_access() {
        let person = Value::map([
            (Value::from("name"), Value::from("josh")),
            (Value::from("age"), Value::Int(32)),
        ]);
        assert_eq!(eval("it.age >= 30", person).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_predicate_requires_bool() {
        let engine = ScriptEngine::new();
        let script = engine.compile("it + 1").unwrap();
        let err = engine.eval_predicate(&script, &Value::Int(1)).unwrap_err();
        assert!(err.to_string().contains("must return a bool"));
    }

    #[test]
    fn test_operation_limit_enforced() {
        let limits = ScriptLimits {
            max_operations: 50,
            ..ScriptLimits::default()
        };
        let engine = ScriptEngine::with_limits(&limits);
        let script = engine.compile("let x = 0; loop { x += 1; }").unwrap();
        let err = engine.eval(&script, &Value::Null).unwrap_err();
        assert!(matches!(err, MachineError::Script(_)));
    }

    #[test]
    fn test_validation() {
        let engine = ScriptEngine::new();
        assert!(engine.validate("it * 2").is_ok());
        assert!(engine.validate("it * ").is_err());
    }

    #[test]
    fn test_caching() {
        let engine = ScriptEngine::new();
        engine.compile("it").unwrap();
        engine.compile("it").unwrap();
        assert_eq!(engine.cached_scripts(), 1);
    }
}
