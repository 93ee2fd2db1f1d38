//! Synthetic modules shared by unit tests.

use std::sync::Arc;

use crate::{
    assembly::{Instruction, MethodBody, OpCode},
    metadata::{
        builder::ModuleBuilder,
        identity::{AssemblyName, AssemblyVersion},
        module::{ModuleDef, ResolutionScope},
        signature::{MethodSig, TypeSig},
        token::Token,
    },
};

/// A module with an int32 decrypter, a string decrypter without body and callers of both.
pub struct CryptoModule {
    pub module: Arc<ModuleDef>,
    /// `Crypto.Strings`
    pub strings_type: Token,
    /// `int32 Decode(int32)`, computes `x * 2 + 1`
    pub decode: Token,
    /// `int32 Other(int32)`, not a decrypter
    pub other: Token,
    /// `string GetString(int32)`, no body
    pub get_string: Token,
    /// `int32 Main()`, returns `Decode(3) + Decode(5)`
    pub main: Token,
    /// `string Greeting()`, returns `(string)GetString(1)`
    pub greeting: Token,
    /// `TypeRef` to `System.String`
    pub string_ref: Token,
    /// `MemberRef` to `string System.String::Intern(string)`
    pub intern: Token,
}

// x * 2 + 1
pub fn affine_body() -> MethodBody {
    MethodBody::new(vec![
        Instruction::ldarg(0),
        Instruction::ldc_i4(2),
        Instruction::simple(OpCode::Mul),
        Instruction::ldc_i4(1),
        Instruction::simple(OpCode::Add),
        Instruction::simple(OpCode::Ret),
    ])
}

pub fn corlib_name() -> AssemblyName {
    AssemblyName::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
        .with_public_key_token([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89])
}

impl CryptoModule {
    pub fn new() -> Self {
        let mut builder = ModuleBuilder::new("Crypto.exe");

        let corlib = builder.add_assembly_ref(corlib_name());
        let string_ref =
            builder.add_type_ref(ResolutionScope::AssemblyRef(corlib), "System", "String");
        let intern = builder.add_method_ref(
            string_ref,
            "Intern",
            MethodSig::new_static(TypeSig::String, vec![TypeSig::String]),
        );

        let strings_type = builder.add_type("Crypto", "Strings");
        let decode = builder.add_method(
            strings_type,
            "Decode",
            MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
            Some(affine_body()),
        );
        let other = builder.add_method(
            strings_type,
            "Other",
            MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
            Some(MethodBody::new(vec![
                Instruction::ldarg(0),
                Instruction::simple(OpCode::Ret),
            ])),
        );
        let get_string = builder.add_method(
            strings_type,
            "GetString",
            MethodSig::new_static(TypeSig::String, vec![TypeSig::I4]),
            None,
        );

        let program = builder.add_type("App", "Program");
        let main = builder.add_method(
            program,
            "Main",
            MethodSig::new_static(TypeSig::I4, vec![]),
            Some(MethodBody::new(vec![
                Instruction::ldc_i4(3),
                Instruction::token(OpCode::Call, decode),
                Instruction::ldc_i4(5),
                Instruction::token(OpCode::Call, decode),
                Instruction::simple(OpCode::Add),
                Instruction::simple(OpCode::Ret),
            ])),
        );
        let greeting = builder.add_method(
            program,
            "Greeting",
            MethodSig::new_static(TypeSig::String, vec![]),
            Some(MethodBody::new(vec![
                Instruction::ldc_i4(1),
                Instruction::token(OpCode::Call, get_string),
                Instruction::token(OpCode::Castclass, string_ref),
                Instruction::simple(OpCode::Ret),
            ])),
        );

        Self {
            module: Arc::new(builder.build()),
            strings_type,
            decode,
            other,
            get_string,
            main,
            greeting,
            string_ref,
            intern,
        }
    }
}
