//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod plugins;

use std::sync::Arc;
use std::time::Duration;
use traversal_machine::structure::MemoryGraph;
use traversal_machine::{
    Compiler, ExecutionContext, LongCoefficient, Registry, Structure, StructureRegistry, Traverser,
    Value,
};

pub type C = LongCoefficient;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(2000)
}

/// The six-vertex fixture graph
pub fn modern() -> Arc<dyn Structure> {
    Arc::new(MemoryGraph::modern())
}

/// Registry with the fixture graph under the token `modern`
pub fn structures(graph: &Arc<dyn Structure>) -> StructureRegistry {
    let mut structures = StructureRegistry::new();
    structures.register("modern", Arc::clone(graph));
    structures
}

/// Standard compiler that can resolve `modern`
pub fn compiler(registry: Registry<C>) -> Compiler<C> {
    Compiler::new(registry).with_structures(structures(&modern()))
}

/// Execution context using the fixture graph as default structure
pub fn context() -> ExecutionContext {
    let graph = modern();
    ExecutionContext::new()
        .with_structures(structures(&graph))
        .with_structure(graph)
}

/// Values of a result list, dropping coefficients and paths
pub fn values(results: Vec<Traverser<C>>) -> Vec<Value> {
    results.into_iter().map(Traverser::into_value).collect()
}
