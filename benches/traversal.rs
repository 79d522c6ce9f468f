//! Benchmarks for compilation and traversal execution
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use traversal_machine::structure::MemoryGraph;
use traversal_machine::{
    Bytecode, Compiler, ExecutionContext, Instruction, LongCoefficient, Registry, Structure,
    StructureRegistry, StructureToken, Value,
};

type C = LongCoefficient;

/// Ring graph where every vertex links to its next `fan_out` neighbours
fn ring(size: i64, fan_out: i64) -> MemoryGraph {
    let mut builder = MemoryGraph::builder("ring");
    for id in 0..size {
        builder = builder.vertex(id, "node", [("rank", Value::Int(id))]);
    }
    for id in 0..size {
        for step in 1..=fan_out {
            builder = builder.edge(id, "next", (id + step) % size);
        }
    }
    match builder.build() {
        Ok(graph) => graph,
        Err(e) => panic!("ring graph is well-formed: {}", e),
    }
}

fn two_hop_count() -> Bytecode<C> {
    Bytecode::new()
        .with(Instruction::new("V").with_arg(StructureToken::new("graph")))
        .with(Instruction::new("out"))
        .with(Instruction::new("out"))
        .with(Instruction::new("count"))
}

fn compiler_for(graph: &Arc<dyn Structure>) -> Compiler<C> {
    let mut structures = StructureRegistry::new();
    structures.register("graph", Arc::clone(graph));
    Compiler::new(Registry::standard()).with_structures(structures)
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let graph: Arc<dyn Structure> = Arc::new(MemoryGraph::modern());
    let compiler = compiler_for(&graph);

    let flat = two_hop_count();
    group.bench_function("two_hop", |b| {
        b.iter(|| black_box(compiler.compile(black_box(&flat))));
    });

    let branch = Bytecode::new().with(
        Instruction::new("union")
            .with_arg(Bytecode::new().with(Instruction::new("out").with_arg("knows")))
            .with_arg(Bytecode::new().with(Instruction::new("out").with_arg("created")))
            .with_arg(Bytecode::new().with(Instruction::new("map").with_arg("it"))),
    );
    group.bench_function("union_with_script", |b| {
        b.iter(|| black_box(compiler.compile(black_box(&branch))));
    });

    group.finish();
}

fn bench_two_hop(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_hop_count");

    for size in [100i64, 1000, 10_000].iter() {
        let graph: Arc<dyn Structure> = Arc::new(ring(*size, 3));
        let compiler = compiler_for(&graph);
        let mut pipeline = match compiler.compile(&two_hop_count()) {
            Ok(p) => p,
            Err(e) => panic!("benchmark bytecode compiles: {}", e),
        };
        let ctx = ExecutionContext::new().with_structure(Arc::clone(&graph));

        group.throughput(Throughput::Elements((*size * 9) as u64));
        group.bench_with_input(BenchmarkId::new("ring", size), size, |b, _| {
            b.iter(|| {
                let out: Vec<_> = pipeline.execute(vec![Value::Null], &ctx).collect();
                black_box(out)
            });
        });
    }

    group.finish();
}

fn bench_first_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_result");
    let graph: Arc<dyn Structure> = Arc::new(ring(10_000, 3));
    let compiler = compiler_for(&graph);
    let code = Bytecode::new()
        .with(Instruction::new("V").with_arg(StructureToken::new("graph")))
        .with(Instruction::new("out"))
        .with(Instruction::new("out"));
    let mut pipeline = match compiler.compile(&code) {
        Ok(p) => p,
        Err(e) => panic!("benchmark bytecode compiles: {}", e),
    };
    let ctx = ExecutionContext::new();

    group.bench_function("lazy_pull", |b| {
        b.iter(|| black_box(pipeline.execute(vec![Value::Null], &ctx).next()));
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_two_hop, bench_first_result);
criterion_main!(benches);
