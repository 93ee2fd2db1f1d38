#![allow(unused)]
extern crate dotinline;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use dotinline::prelude::*;
use std::{hint::black_box, sync::Arc};

/// `x * 2 + 1`
fn affine_body() -> MethodBody {
    MethodBody::new(vec![
        Instruction::ldarg(0),
        Instruction::ldc_i4(2),
        Instruction::simple(OpCode::Mul),
        Instruction::ldc_i4(1),
        Instruction::simple(OpCode::Add),
        Instruction::simple(OpCode::Ret),
    ])
}

/// `sum ^= i * 31` for `i` from `x` down to 1
fn loop_body() -> MethodBody {
    MethodBody::new(vec![
        Instruction::ldc_i4(0),
        Instruction::stloc(0),
        Instruction::ldarg(0),
        Instruction::stloc(1),
        Instruction::branch(OpCode::Br, 15),
        Instruction::ldloc(0),
        Instruction::ldloc(1),
        Instruction::ldc_i4(31),
        Instruction::simple(OpCode::Mul),
        Instruction::simple(OpCode::Xor),
        Instruction::stloc(0),
        Instruction::ldloc(1),
        Instruction::ldc_i4(1),
        Instruction::simple(OpCode::Sub),
        Instruction::stloc(1),
        Instruction::ldloc(1),
        Instruction::branch(OpCode::Brtrue, 5),
        Instruction::ldloc(0),
        Instruction::simple(OpCode::Ret),
    ])
    .with_locals(vec![TypeSig::I4, TypeSig::I4])
}

fn bench_evaluate(c: &mut Criterion) {
    let mut builder = ModuleBuilder::new("Bench.dll");
    let ty = builder.add_type("Bench", "Strings");
    let sig = MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]);
    let affine = builder.add_method(ty, "Affine", sig.clone(), Some(affine_body()));
    let looped = builder.add_method(ty, "Loop", sig, Some(loop_body()));
    let module = builder.build();

    let evaluator = MethodEvaluator::new(1_000);
    let affine = module.method_def(affine).unwrap();
    let looped = module.method_def(looped).unwrap();

    c.bench_function("evaluate_affine", |b| {
        b.iter(|| {
            let evaluation = evaluator
                .evaluate(black_box(affine), &[SymbolicValue::Known(20)])
                .unwrap();
            black_box(evaluation)
        });
    });

    c.bench_function("evaluate_loop_16", |b| {
        b.iter(|| {
            let evaluation = evaluator
                .evaluate(black_box(looped), &[SymbolicValue::Known(16)])
                .unwrap();
            black_box(evaluation)
        });
    });
}

/// A module with one decrypter and a caller holding `sites` call sites.
fn crypto_module(sites: i32) -> (Arc<ModuleDef>, Token) {
    let mut builder = ModuleBuilder::new("Crypto.exe");
    let ty = builder.add_type("Crypto", "Strings");
    let decode = builder.add_method(
        ty,
        "Decode",
        MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
        Some(affine_body()),
    );

    let mut instructions = Vec::new();
    for i in 0..sites {
        instructions.push(Instruction::ldc_i4(i));
        instructions.push(Instruction::token(OpCode::Call, decode));
        instructions.push(Instruction::simple(OpCode::Pop));
    }
    instructions.push(Instruction::simple(OpCode::Ret));
    builder.add_method(
        ty,
        "Main",
        MethodSig::new_static(TypeSig::Void, vec![]),
        Some(MethodBody::new(instructions)),
    );

    (Arc::new(builder.build()), decode)
}

fn bench_inline(c: &mut Criterion) {
    c.bench_function("inline_module_100_sites", |b| {
        b.iter_batched(
            || {
                let (module, decode) = crypto_module(100);
                let mut registry = DecrypterRegistry::new();
                registry
                    .register_method(&module, decode, emulated_handler())
                    .unwrap();
                let inliner = CallSiteInliner::new(
                    StaticStrategy::new(registry),
                    Arc::new(ResolverContext::new()),
                );
                (module, inliner)
            },
            |(module, inliner)| black_box(inliner.inline_module(&module).unwrap()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_evaluate, bench_inline);
criterion_main!(benches);
