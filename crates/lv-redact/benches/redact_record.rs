//! Criterion benchmarks for `lv-redact`.
//!
//! Focus on the per-record hot path a logging call pays for.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lv_redact::{FieldMaskConfig, Level, Record, RedactionEngine, Value, ValueMap};

fn engine() -> RedactionEngine {
    RedactionEngine::builder()
        .with_default_patterns()
        .field_path("user.password", FieldMaskConfig::remove())
        .field_path("users.*.token", FieldMaskConfig::replace("***"))
        .data_type_mask("double", "0.0")
        .build()
        .expect("benchmark engine")
}

fn context(width: usize) -> ValueMap {
    let mut users = ValueMap::new();
    for i in 0..width {
        let mut user = ValueMap::new();
        user.insert("email", Value::from(format!("user{}@example.com", i)));
        user.insert("token", Value::from(format!("tok-{}", i)));
        user.insert("score", Value::Float(i as f64));
        users.insert(format!("u{}", i), Value::Map(user));
    }

    let mut user = ValueMap::new();
    user.insert("password", Value::from("hunter2"));
    user.insert("ssn", Value::from("123-45-6789"));

    let mut context = ValueMap::new();
    context.insert("user", Value::Map(user));
    context.insert("users", Value::Map(users));
    context
}

fn bench_process(c: &mut Criterion) {
    let engine = engine();
    let mut group = c.benchmark_group("process");

    for (name, message) in [
        ("plain", "user logged in after 3 attempts"),
        ("pii", "call +358401234567 or mail john.doe@example.com, ssn 123-45-6789"),
        (
            "embedded_json",
            r#"request {"user":{"email":"a@b.io","card":"4111 1111 1111 1111"},"tags":[],"meta":{}}"#,
        ),
    ] {
        let record = Record::new("app", Level::Info, message);
        group.bench_with_input(BenchmarkId::new("message", name), &record, |b, record| {
            b.iter(|| black_box(engine.process(black_box(record))));
        });
    }

    for width in [1usize, 10, 100] {
        let record = Record::new("app", Level::Info, "ctx").with_context(context(width));
        group.bench_with_input(BenchmarkId::new("context", width), &record, |b, record| {
            b.iter(|| black_box(engine.process(black_box(record))));
        });
    }

    group.finish();
}

fn bench_validator(c: &mut Criterion) {
    let engine = engine();
    c.bench_function("validator/cached", |b| {
        b.iter(|| black_box(engine.validator().validate(black_box(r"/\d{3}-\d{2}-\d{4}/"))));
    });
}

criterion_group!(benches, bench_process, bench_validator);
criterion_main!(benches);
