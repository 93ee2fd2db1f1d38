//! End-to-end call-site inlining scenarios.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use dotinline::{
    assembly::encode_stream,
    deobfuscation::{DecryptFn, ExecutorConfig},
    prelude::*,
};

fn crypto_name() -> AssemblyName {
    AssemblyName::new("Crypto", AssemblyVersion::new(1, 0, 0, 0))
}

fn corlib_name() -> AssemblyName {
    AssemblyName::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
        .with_public_key_token([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89])
}

struct Library {
    module: Arc<ModuleDef>,
    decode: Token,
}

/// `Crypto.dll` exporting `int32 Crypto.Strings::Decode(int32)`, computing `x * 2 + 1`.
fn library() -> Library {
    let mut builder = ModuleBuilder::new("Crypto.dll").with_assembly(crypto_name());
    let strings = builder.add_type("Crypto", "Strings");
    let decode = builder.add_method(
        strings,
        "Decode",
        MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
        Some(MethodBody::new(vec![
            Instruction::ldarg(0),
            Instruction::ldc_i4(2),
            Instruction::simple(OpCode::Mul),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::Add),
            Instruction::simple(OpCode::Ret),
        ])),
    );
    Library {
        module: Arc::new(builder.build()),
        decode,
    }
}

struct App {
    module: Arc<ModuleDef>,
    main: Token,
    write_line: Token,
}

/// `App.exe` whose `Main` prints `Decode(3) + Decode(5)`, calling into `assembly`.
fn app(assembly: AssemblyName) -> App {
    let mut builder = ModuleBuilder::new("App.exe");
    let crypto = builder.add_assembly_ref(assembly);
    let corlib = builder.add_assembly_ref(corlib_name());
    let strings = builder.add_type_ref(ResolutionScope::AssemblyRef(crypto), "Crypto", "Strings");
    let console = builder.add_type_ref(ResolutionScope::AssemblyRef(corlib), "System", "Console");
    let decode = builder.add_method_ref(
        strings,
        "Decode",
        MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
    );
    let write_line = builder.add_method_ref(
        console,
        "WriteLine",
        MethodSig::new_static(TypeSig::Void, vec![TypeSig::I4]),
    );

    let program = builder.add_type("App", "Program");
    let main = builder.add_method(
        program,
        "Main",
        MethodSig::new_static(TypeSig::Void, vec![]),
        Some(MethodBody::new(vec![
            Instruction::ldc_i4(3),
            Instruction::token(OpCode::Call, decode),
            Instruction::ldc_i4(5),
            Instruction::token(OpCode::Call, decode),
            Instruction::simple(OpCode::Add),
            Instruction::token(OpCode::Call, write_line),
            Instruction::simple(OpCode::Ret),
        ])),
    );
    App {
        module: Arc::new(builder.build()),
        main,
        write_line,
    }
}

fn body(module: &ModuleDef, method: Token) -> MethodBody {
    module.method_def(method).unwrap().body().unwrap().unwrap()
}

#[test]
fn cross_module_decrypter_is_emulated() {
    let library = library();
    let app = app(crypto_name());

    let mut registry = DecrypterRegistry::new();
    registry
        .register_method(&library.module, library.decode, emulated_handler())
        .unwrap();
    let inliner = CallSiteInliner::new(StaticStrategy::new(registry), Arc::new(ResolverContext::new()));

    let results = inliner.inline_modules(&[library.module.clone(), app.module.clone()]);
    let reports: Vec<InlineReport> = results.into_iter().map(|result| result.unwrap()).collect();
    assert_eq!(reports[0], InlineReport::default());
    assert_eq!(reports[1].replaced, 2);
    assert_eq!(reports[1].skipped, 0);
    assert_eq!(reports[1].methods_changed, 1);

    let main = body(&app.module, app.main);
    assert_eq!(
        main.instructions,
        vec![
            Instruction::ldc_i4(7),
            Instruction::ldc_i4(11),
            Instruction::simple(OpCode::Add),
            Instruction::token(OpCode::Call, app.write_line),
            Instruction::simple(OpCode::Ret),
        ]
    );
    assert_eq!(main.instructions[0].opcode.mnemonic(), "ldc.i4.7");
    assert_eq!(main.instructions[1].opcode.mnemonic(), "ldc.i4.s");

    let encoded = encode_stream(&main.instructions, |_| unreachable!()).unwrap();
    assert_eq!(
        encoded.code,
        vec![0x1D, 0x1F, 0x0B, 0x58, 0x28, 0x02, 0x00, 0x00, 0x0A, 0x2A]
    );
}

#[test]
fn decrypter_registered_by_signature() {
    let library = library();
    let app = app(crypto_name());

    let mut registry = DecrypterRegistry::new();
    registry.register_signature(
        SignatureKey::new("Crypto.Strings", "Decode", "System.Int32(System.Int32)"),
        emulated_handler(),
    );

    let context = Arc::new(ResolverContext::new());
    context.add_module(library.module.clone());
    let inliner = CallSiteInliner::new(StaticStrategy::new(registry), context);

    let report = inliner.inline_module(&app.module).unwrap();
    assert_eq!(report.replaced, 2);
}

#[test]
fn unresolvable_decrypter_reference_leaves_method_untouched() {
    let library = library();
    // The app was linked against a different assembly that is not available
    let app = app(AssemblyName::new("Crypto.Legacy", AssemblyVersion::new(1, 0, 0, 0)));
    let before = body(&app.module, app.main);

    let mut registry = DecrypterRegistry::new();
    registry
        .register_method(&library.module, library.decode, emulated_handler())
        .unwrap();
    let context = Arc::new(ResolverContext::new());
    context.add_module(library.module.clone());
    let inliner = CallSiteInliner::new(StaticStrategy::new(registry), context);

    let report = inliner.inline_module(&app.module).unwrap();
    assert_eq!(report.unresolved, 2);
    assert_eq!(report.replaced, 0);
    assert_eq!(report.methods_changed, 0);
    assert!(report.failed.is_empty());
    assert_eq!(body(&app.module, app.main), before);
}

#[test]
fn unresolvable_calls_do_not_stop_the_module() {
    let sig = MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]);
    let mut builder = ModuleBuilder::new("App.exe");
    let corlib = builder.add_assembly_ref(corlib_name());
    let legacy = builder.add_assembly_ref(AssemblyName::new(
        "Crypto.Legacy",
        AssemblyVersion::new(1, 0, 0, 0),
    ));
    let convert = builder.add_type_ref(ResolutionScope::AssemblyRef(corlib), "System", "Convert");
    let legacy_strings =
        builder.add_type_ref(ResolutionScope::AssemblyRef(legacy), "Crypto", "Strings");
    let convert_decode = builder.add_method_ref(convert, "Decode", sig.clone());
    let legacy_decode = builder.add_method_ref(legacy_strings, "Decode", sig.clone());

    let strings = builder.add_type("Crypto", "Strings");
    let decode = builder.add_method(
        strings,
        "Decode",
        sig,
        Some(MethodBody::new(vec![
            Instruction::ldarg(0),
            Instruction::ldc_i4(2),
            Instruction::simple(OpCode::Mul),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::Add),
            Instruction::simple(OpCode::Ret),
        ])),
    );
    let program = builder.add_type("App", "Program");
    let first = builder.add_method(
        program,
        "First",
        MethodSig::new_static(TypeSig::I4, vec![]),
        Some(MethodBody::new(vec![
            Instruction::ldc_i4(1),
            Instruction::token(OpCode::Call, convert_decode),
            Instruction::ldc_i4(2),
            Instruction::token(OpCode::Call, legacy_decode),
            Instruction::simple(OpCode::Add),
            Instruction::simple(OpCode::Ret),
        ])),
    );
    let main = builder.add_method(
        program,
        "Main",
        MethodSig::new_static(TypeSig::I4, vec![]),
        Some(MethodBody::new(vec![
            Instruction::ldc_i4(3),
            Instruction::token(OpCode::Call, decode),
            Instruction::simple(OpCode::Ret),
        ])),
    );
    let module = Arc::new(builder.build());
    let before = body(&module, first);

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let loader = move |_: &AssemblyName| -> Result<Option<Arc<ModuleDef>>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    };

    let mut registry = DecrypterRegistry::new();
    registry
        .register_method(&module, decode, emulated_handler())
        .unwrap();
    let context = Arc::new(ResolverContext::new().with_loader(Arc::new(loader)));
    let inliner = CallSiteInliner::new(StaticStrategy::new(registry), context);

    let report = inliner.inline_module(&module).unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(report.unresolved, 1);
    assert_eq!(report.methods_changed, 1);
    assert!(report.failed.is_empty());

    // Only the legacy assembly is looked up; System.Convert::Decode is not a candidate
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(body(&module, first), before);
    assert_eq!(
        body(&module, main).instructions,
        vec![Instruction::ldc_i4(7), Instruction::simple(OpCode::Ret)]
    );
}

/// Answers with `x * 2 + 1` but loses the first request.
struct Lossy;

impl DecrypterTransport for Lossy {
    fn decrypt(
        &mut self,
        _decrypter: i32,
        batch: Vec<Vec<ConstValue>>,
        _caller: Token,
    ) -> Result<Vec<ConstValue>> {
        Ok(batch
            .iter()
            .skip(1)
            .map(|args| match args[0].as_i32() {
                Some(x) => ConstValue::I32(x * 2 + 1),
                None => ConstValue::Null,
            })
            .collect())
    }
}

#[test]
fn short_batch_applies_nothing() {
    let library = library();
    let app = app(crypto_name());
    let before = body(&app.module, app.main);

    let mut registry = DecrypterRegistry::new();
    registry
        .register_method(&library.module, library.decode, 1)
        .unwrap();
    let context = Arc::new(ResolverContext::new());
    context.add_module(library.module.clone());
    let inliner = CallSiteInliner::new(RemoteStrategy::new(registry, Lossy), context);

    match inliner.inline_module(&app.module) {
        Err(Error::BatchMismatch {
            decrypter,
            expected,
            actual,
        }) => assert_eq!((decrypter, expected, actual), (1, 2, 1)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(body(&app.module, app.main), before);
}

#[test]
fn isolated_executor_decrypts_strings() {
    let mut builder = ModuleBuilder::new("Strings.exe");
    let corlib = builder.add_assembly_ref(corlib_name());
    let string_ref = builder.add_type_ref(ResolutionScope::AssemblyRef(corlib), "System", "String");
    let crypto = builder.add_type("Crypto", "Strings");
    let get_string = builder.add_method(
        crypto,
        "GetString",
        MethodSig::new_static(TypeSig::String, vec![TypeSig::I4]),
        None,
    );
    let program = builder.add_type("App", "Program");
    let greeting = builder.add_method(
        program,
        "Greeting",
        MethodSig::new_static(TypeSig::String, vec![]),
        Some(MethodBody::new(vec![
            Instruction::ldc_i4(1),
            Instruction::token(OpCode::Call, get_string),
            Instruction::token(OpCode::Castclass, string_ref),
            Instruction::ldc_i4(404),
            Instruction::token(OpCode::Call, get_string),
            Instruction::simple(OpCode::Pop),
            Instruction::simple(OpCode::Ret),
        ])),
    );
    let module = Arc::new(builder.build());

    let table = ["hello", "world"];
    let mut decrypters: HashMap<i32, DecryptFn> = HashMap::new();
    decrypters.insert(
        7,
        Box::new(move |args| {
            let index = usize::try_from(args.first()?.as_i32()?).ok()?;
            table.get(index).map(|s| ConstValue::String((*s).to_string()))
        }),
    );
    let executor = IsolatedExecutor::spawn(
        decrypters,
        ExecutorConfig::default().with_timeout(Duration::from_secs(5)),
    )
    .unwrap();

    let mut registry = DecrypterRegistry::new();
    registry.register_method(&module, get_string, 7).unwrap();
    let inliner = CallSiteInliner::new(
        RemoteStrategy::new(registry, executor),
        Arc::new(ResolverContext::new()),
    );

    let report = inliner.inline_module(&module).unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(report.skipped, 1);

    let rewritten = body(&module, greeting);
    assert_eq!(
        rewritten.instructions,
        vec![
            Instruction::ldstr("world"),
            Instruction::ldc_i4(404),
            Instruction::token(OpCode::Call, get_string),
            Instruction::simple(OpCode::Pop),
            Instruction::simple(OpCode::Ret),
        ]
    );

    let usage = inliner.strategy().statistics().get(7);
    assert_eq!((usage.calls, usage.non_null_results), (2, 1));
    assert!(inliner.strategy().statistics().report_unproductive().is_empty());

    let encoded = encode_stream(&rewritten.instructions, |literal| {
        assert_eq!(literal, "world");
        Ok(Token::new(0x70000001))
    })
    .unwrap();
    assert_eq!(&encoded.code[..5], &[0x72, 0x01, 0x00, 0x00, 0x70]);
}
