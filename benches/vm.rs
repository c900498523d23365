//! Benchmarks for the compiler and the bytecode VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gscript::config::Config;
use gscript::module::compile_source;
use gscript::stdlib;
use gscript::vm::{Proto, Vm};
use std::fs;

fn compile(source: &str) -> Vec<Proto> {
    compile_source(source, "bench.gs", &Config::default()).expect("compile error")
}

/// Run already-compiled protos to completion.
fn run_vm(protos: &[Proto], stdlibs: &[Proto]) {
    let mut vm = Vm::new(protos.to_vec(), stdlibs.to_vec(), &Config::default());
    vm.capture_output();
    vm.run().expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.gs", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn programs(c: &mut Criterion) {
    let stdlibs = stdlib::compile_all().expect("stdlib compile error");
    let mut group = c.benchmark_group("programs");
    for name in ["fib_recursive", "fib_iterative", "loop_sum", "objects"] {
        let protos = compile(&load_program(name));
        group.bench_function(name, |b| b.iter(|| run_vm(black_box(&protos), &stdlibs)));
    }
    group.finish();
}

fn fib_scaling(c: &mut Criterion) {
    let stdlibs = stdlib::compile_all().expect("stdlib compile error");
    let mut group = c.benchmark_group("fib_scaling");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
func fib(n) {{
  if (n <= 1) {{
    return n
  }}
  return fib(n - 1) + fib(n - 2)
}}
let result = fib({})
"#,
            n
        );
        let protos = compile(&source);
        group.bench_with_input(BenchmarkId::new("vm", n), &protos, |b, protos| {
            b.iter(|| run_vm(black_box(protos), &stdlibs))
        });
    }

    group.finish();
}

/// Benchmark compilation time alone (not execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    for name in ["fib_recursive", "loop_sum", "objects"] {
        let source = load_program(name);
        group.bench_function(name, |b| b.iter(|| compile(black_box(&source))));
    }
    group.bench_function("stdlib", |b| b.iter(stdlib::compile_all));

    group.finish();
}

criterion_group!(benches, programs, fib_scaling, compilation_overhead);

criterion_main!(benches);
