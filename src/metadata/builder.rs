//! Programmatic construction of [`ModuleDef`]s.
//!
//! Drivers that lift a parsed binary into this crate's model, and tests that need synthetic
//! modules, add rows through [`ModuleBuilder`]. Every `add_*` method returns the token of
//! the new row, so later rows can reference it.
//!
//! ```rust
//! use dotinline::assembly::{Instruction, MethodBody, OpCode};
//! use dotinline::metadata::{builder::ModuleBuilder, signature::{MethodSig, TypeSig}};
//!
//! let mut builder = ModuleBuilder::new("Crypto.dll");
//! let strings = builder.add_type("Crypto", "Strings");
//! let get = builder.add_method(
//!     strings,
//!     "Get",
//!     MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
//!     Some(MethodBody::new(vec![Instruction::ldarg(0), Instruction::simple(OpCode::Ret)])),
//! );
//! let module = builder.build();
//!
//! assert_eq!(module.method_def(get)?.name, "Get");
//! # Ok::<(), dotinline::Error>(())
//! ```

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use uguid::Guid;

use crate::{
    assembly::MethodBody,
    metadata::{
        identity::AssemblyName,
        module::{
            FieldDef, MemberRef, MethodDef, MethodSpec, ModuleDef, ResolutionScope, TypeDef,
            TypeRef,
        },
        signature::{MemberSig, MethodSig, TypeSig},
        token::Token,
    },
};

static NEXT_MVID: AtomicU64 = AtomicU64::new(1);

fn fresh_mvid() -> Guid {
    let serial = NEXT_MVID.fetch_add(1, Ordering::Relaxed);
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(b"dotinlin");
    bytes[8..].copy_from_slice(&serial.to_be_bytes());
    Guid::from_bytes(bytes)
}

fn token_for(table: u8, len: usize) -> Token {
    Token::from_parts(table, len as u32)
}

/// Incremental builder for a [`ModuleDef`].
pub struct ModuleBuilder {
    module: ModuleDef,
    next_user_string: u32,
}

impl ModuleBuilder {
    /// Starts a module with a fresh, process-unique MVID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: ModuleDef {
                name: name.into(),
                mvid: fresh_mvid(),
                assembly: None,
                types: Vec::new(),
                methods: Vec::new(),
                fields: Vec::new(),
                type_refs: Vec::new(),
                member_refs: Vec::new(),
                type_specs: Vec::new(),
                method_specs: Vec::new(),
                assembly_refs: Vec::new(),
                module_refs: Vec::new(),
                user_strings: HashMap::new(),
            },
            next_user_string: 1,
        }
    }

    /// Overrides the MVID.
    #[must_use]
    pub fn with_mvid(mut self, mvid: Guid) -> Self {
        self.module.mvid = mvid;
        self
    }

    /// Makes this module the manifest module of `assembly`.
    #[must_use]
    pub fn with_assembly(mut self, assembly: AssemblyName) -> Self {
        self.module.assembly = Some(assembly);
        self
    }

    /// Adds a top-level, non-generic type.
    pub fn add_type(&mut self, namespace: &str, name: &str) -> Token {
        self.push_type(namespace, name, None, 0)
    }

    /// Adds a top-level generic type with `generic_params` type parameters.
    pub fn add_generic_type(&mut self, namespace: &str, name: &str, generic_params: u32) -> Token {
        self.push_type(namespace, name, None, generic_params)
    }

    /// Adds a type nested in `enclosing`.
    pub fn add_nested_type(&mut self, enclosing: Token, name: &str) -> Token {
        self.push_type("", name, Some(enclosing), 0)
    }

    fn push_type(
        &mut self,
        namespace: &str,
        name: &str,
        enclosing: Option<Token>,
        generic_params: u32,
    ) -> Token {
        self.module.types.push(TypeDef {
            namespace: namespace.to_string(),
            name: name.to_string(),
            enclosing,
            generic_params,
            methods: Vec::new(),
            fields: Vec::new(),
        });
        token_for(Token::TYPE_DEF, self.module.types.len())
    }

    fn owner(&mut self, declaring_type: Token) -> Option<&mut TypeDef> {
        if !declaring_type.is_table(Token::TYPE_DEF) {
            return None;
        }
        declaring_type
            .index()
            .and_then(|index| self.module.types.get_mut(index))
    }

    /// Adds a method to `declaring_type`.
    pub fn add_method(
        &mut self,
        declaring_type: Token,
        name: &str,
        signature: MethodSig,
        body: Option<MethodBody>,
    ) -> Token {
        self.module
            .methods
            .push(MethodDef::new(name, declaring_type, signature, body));
        let token = token_for(Token::METHOD_DEF, self.module.methods.len());
        if let Some(owner) = self.owner(declaring_type) {
            owner.methods.push(token);
        }
        token
    }

    /// Adds a field to `declaring_type`.
    pub fn add_field(&mut self, declaring_type: Token, name: &str, signature: TypeSig) -> Token {
        self.module.fields.push(FieldDef {
            name: name.to_string(),
            declaring_type,
            signature,
        });
        let token = token_for(Token::FIELD, self.module.fields.len());
        if let Some(owner) = self.owner(declaring_type) {
            owner.fields.push(token);
        }
        token
    }

    /// Adds an `AssemblyRef`.
    pub fn add_assembly_ref(&mut self, name: AssemblyName) -> Token {
        self.module.assembly_refs.push(name);
        token_for(Token::ASSEMBLY_REF, self.module.assembly_refs.len())
    }

    /// Adds a `ModuleRef`.
    pub fn add_module_ref(&mut self, name: &str) -> Token {
        self.module.module_refs.push(name.to_string());
        token_for(Token::MODULE_REF, self.module.module_refs.len())
    }

    /// Adds a `TypeRef`.
    pub fn add_type_ref(&mut self, scope: ResolutionScope, namespace: &str, name: &str) -> Token {
        self.module.type_refs.push(TypeRef {
            scope,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        token_for(Token::TYPE_REF, self.module.type_refs.len())
    }

    /// Adds a `MemberRef` to a method.
    pub fn add_method_ref(&mut self, parent: Token, name: &str, signature: MethodSig) -> Token {
        self.add_member_ref(parent, name, MemberSig::Method(signature))
    }

    /// Adds a `MemberRef` to a field.
    pub fn add_field_ref(&mut self, parent: Token, name: &str, signature: TypeSig) -> Token {
        self.add_member_ref(parent, name, MemberSig::Field(signature))
    }

    /// Adds a `MemberRef`.
    pub fn add_member_ref(&mut self, parent: Token, name: &str, signature: MemberSig) -> Token {
        self.module.member_refs.push(MemberRef {
            parent,
            name: name.to_string(),
            signature,
        });
        token_for(Token::MEMBER_REF, self.module.member_refs.len())
    }

    /// Adds a `TypeSpec`.
    pub fn add_type_spec(&mut self, signature: TypeSig) -> Token {
        self.module.type_specs.push(signature);
        token_for(Token::TYPE_SPEC, self.module.type_specs.len())
    }

    /// Adds a `MethodSpec` instantiating `method`.
    pub fn add_method_spec(&mut self, method: Token, instantiation: Vec<TypeSig>) -> Token {
        self.module.method_specs.push(MethodSpec {
            method,
            instantiation,
        });
        token_for(Token::METHOD_SPEC, self.module.method_specs.len())
    }

    /// Appends a literal to the `#US` heap and returns its `ldstr` token.
    pub fn add_user_string(&mut self, value: &str) -> Token {
        let offset = self.next_user_string;
        // length prefix, UTF-16 payload, terminal flag byte
        let payload = value.encode_utf16().count() as u32 * 2 + 1;
        let prefix = if payload < 0x80 {
            1
        } else if payload < 0x4000 {
            2
        } else {
            4
        };
        self.next_user_string += prefix + payload;
        self.module.user_strings.insert(offset, value.to_string());
        Token::from_parts(Token::USER_STRING, offset)
    }

    /// Finishes the module.
    #[must_use]
    pub fn build(self) -> ModuleDef {
        self.module
    }
}
