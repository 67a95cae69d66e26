// Lowering benchmarks: descriptor construction and full kernel/user emission
// over programs widened from the router fixture.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;

use mtlc::codegen::{build_descriptors, CodegenOptions};
use mtlc::ir::{DeclId, Program};
use mtlc::pass::PassId;
use mtlc::pipeline::{run_pipeline, CompilationState};

fn router() -> Program {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("router.json");
    Program::load(&path).unwrap()
}

/// Router program with `copies` extra clones of every table.
fn widened(copies: u32) -> Program {
    let mut program = router();
    let base = program.tables.clone();
    for i in 0..copies {
        for (j, t) in base.iter().enumerate() {
            let mut t = t.clone();
            t.name = format!("{}_{}", t.name, i);
            t.decl = DeclId(10_000 + i * 100 + j as u32);
            program.tables.push(t);
        }
    }
    program
}

const SIZES: [u32; 3] = [1, 16, 128];

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_descriptors");

    for copies in SIZES {
        let program = widened(copies);
        group.bench_with_input(BenchmarkId::from_parameter(copies), &program, |b, program| {
            b.iter(|| {
                let mut diags = Vec::new();
                let lowering = build_descriptors(black_box(program), &mut diags).unwrap();
                black_box(lowering.tables.len());
            });
        });
    }

    group.finish();
}

fn bench_stage(c: &mut Criterion, group_name: &str, terminal: PassId) {
    let mut group = c.benchmark_group(group_name);
    let options = CodegenOptions::default();

    for copies in SIZES {
        let program = widened(copies);
        group.bench_with_input(BenchmarkId::from_parameter(copies), &program, |b, program| {
            b.iter(|| {
                let mut state = CompilationState::new(program.clone());
                run_pipeline(&mut state, terminal, &options, |_, _| {}).unwrap();
                black_box(state.generated(&options));
            });
        });
    }

    group.finish();
}

fn bench_kernel(c: &mut Criterion) {
    bench_stage(c, "emit_kernel", PassId::Apply);
}

fn bench_user(c: &mut Criterion) {
    bench_stage(c, "emit_user", PassId::Initializer);
}

criterion_group!(benches, bench_build, bench_kernel, bench_user);
criterion_main!(benches);
