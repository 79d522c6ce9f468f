//! Integration tests for pull-driven execution
//!
//! An instrumented source counts how many items were pulled out of it, which
//! makes it possible to check that each result costs only the upstream work
//! needed to produce it.

mod common;

use common::builders::BytecodeBuilder;
use common::plugins::{instrumented_registry, Counter};
use common::{compiler, context, values, C};
use traversal_machine::{Bytecode, Instruction, Pipeline, Value};

fn build(code: &Bytecode<C>, pulled: &Counter, applied: &Counter) -> Pipeline<C> {
    compiler(instrumented_registry(pulled, applied))
        .compile(code)
        .unwrap()
}

#[test]
fn test_nothing_runs_until_pulled() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let code = BytecodeBuilder::new()
        .step_with("counting_source", [100i64])
        .step("counting_pass")
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let processor = pipeline.execute(Vec::new(), &ctx);
    assert_eq!(pulled.get(), 0);
    assert_eq!(applied.get(), 0);
    drop(processor);
}

#[test]
fn test_one_pull_does_one_item_of_work() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let code = BytecodeBuilder::new()
        .step_with("counting_source", [100i64])
        .step("counting_pass")
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let mut processor = pipeline.execute(Vec::new(), &ctx);
    let first = processor.next().unwrap().unwrap();
    assert_eq!(first.value(), &Value::Int(0));
    assert_eq!(pulled.get(), 1);
    assert_eq!(applied.get(), 1);

    processor.next().unwrap().unwrap();
    assert_eq!(pulled.get(), 2);
    assert_eq!(applied.get(), 2);
}

#[test]
fn test_limit_stops_pulling_upstream() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let code = BytecodeBuilder::new()
        .step_with("counting_source", [1000i64])
        .step_with("limit", [3i64])
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let out: Vec<_> = pipeline.execute(Vec::new(), &ctx).take(3).collect();
    assert_eq!(out.len(), 3);
    assert_eq!(pulled.get(), 3);
}

#[test]
fn test_filter_pulls_until_match() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let code = BytecodeBuilder::new()
        .step_with("counting_source", [1000i64])
        .instruction(Instruction::new("is").with_arg("gte").with_arg(10i64))
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let mut processor = pipeline.execute(Vec::new(), &ctx);
    assert_eq!(processor.next().unwrap().unwrap().value(), &Value::Int(10));
    assert_eq!(pulled.get(), 11);
}

#[test]
fn test_reduce_drains_on_first_pull() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let code = BytecodeBuilder::new()
        .step_with("counting_source", [50i64])
        .step("count")
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let mut processor = pipeline.execute(Vec::new(), &ctx);
    assert_eq!(pulled.get(), 0);
    assert_eq!(processor.next().unwrap().unwrap().value(), &Value::Int(50));
    assert_eq!(pulled.get(), 50);
    assert!(processor.next().is_none());
}

#[test]
fn test_where_pulls_at_most_one_nested_result() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let nested = BytecodeBuilder::new()
        .step("counting_pass")
        .step("unfold")
        .build();
    let code = BytecodeBuilder::new()
        .step_with("where", [nested])
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let seed = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let out = values(
        pipeline
            .execute(vec![seed.clone(), Value::List(Vec::new())], &ctx)
            .collect::<Result<_, _>>()
            .unwrap(),
    );
    assert_eq!(out, vec![seed]);
    assert_eq!(applied.get(), 2);
}

#[test]
fn test_union_pulls_branch_outputs_lazily() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let branch = BytecodeBuilder::new()
        .step("unfold")
        .step("counting_pass")
        .build();
    let code = BytecodeBuilder::new().step_with("union", [branch]).build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let seed = Value::List((0..1000).map(Value::Int).collect());
    let mut processor = pipeline.execute(vec![seed], &ctx);
    assert_eq!(processor.next().unwrap().unwrap().value(), &Value::Int(0));
    assert_eq!(applied.get(), 1);

    processor.next().unwrap().unwrap();
    assert_eq!(applied.get(), 2);
}

#[test]
fn test_union_starts_later_branch_only_when_earlier_is_exhausted() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let first = BytecodeBuilder::new().step("unfold").build();
    let second = BytecodeBuilder::new().step("counting_pass").build();
    let code = BytecodeBuilder::new()
        .step_with("union", [first, second])
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let seed = Value::List(vec![Value::Int(1), Value::Int(2)]);
    let mut processor = pipeline.execute(vec![seed.clone()], &ctx);
    processor.next().unwrap().unwrap();
    processor.next().unwrap().unwrap();
    assert_eq!(applied.get(), 0);

    assert_eq!(processor.next().unwrap().unwrap().value(), &seed);
    assert_eq!(applied.get(), 1);
    assert!(processor.next().is_none());
}

#[test]
fn test_coalesce_skips_branches_after_a_match() {
    let (pulled, applied) = (Counter::new(), Counter::new());
    let first = BytecodeBuilder::new().step("unfold").build();
    let fallback = BytecodeBuilder::new().step("counting_pass").build();
    let code = BytecodeBuilder::new()
        .step_with("coalesce", [first, fallback])
        .build();
    let mut pipeline = build(&code, &pulled, &applied);
    let ctx = context();

    let out = values(
        pipeline
            .execute(
                vec![Value::List(vec![Value::Int(1), Value::Int(2)]), Value::List(Vec::new())],
                &ctx,
            )
            .collect::<Result<_, _>>()
            .unwrap(),
    );
    assert_eq!(
        out,
        vec![Value::Int(1), Value::Int(2), Value::List(Vec::new())]
    );
    assert_eq!(applied.get(), 1);
}
