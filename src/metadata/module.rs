//! Loaded modules.
//!
//! [`ModuleDef`] is the in-memory form of one .NET module: its metadata rows, indexed by
//! [`Token`], and the method bodies the inliner rewrites. Rows are immutable once the module
//! is built; bodies sit behind a lock so they can be replaced while the module is shared
//! between threads through an [`Arc`](std::sync::Arc).

use std::{
    collections::HashMap,
    fmt::Write,
    sync::RwLock,
};

use uguid::Guid;

use crate::{
    assembly::MethodBody,
    metadata::{
        identity::AssemblyName,
        signature::{MemberSig, MethodSig, TypeSig},
        token::Token,
    },
    Error, Result,
};

/// A row of the `TypeDef` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Namespace, empty for the global namespace and for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Enclosing type of a nested type
    pub enclosing: Option<Token>,
    /// Number of generic type parameters
    pub generic_params: u32,
    /// Methods declared by this type
    pub methods: Vec<Token>,
    /// Fields declared by this type
    pub fields: Vec<Token>,
}

/// A row of the `MethodDef` table together with its body.
#[derive(Debug)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Declaring `TypeDef`
    pub declaring_type: Token,
    /// Method signature
    pub signature: MethodSig,
    body: RwLock<Option<MethodBody>>,
}

impl MethodDef {
    /// Creates a method definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        declaring_type: Token,
        signature: MethodSig,
        body: Option<MethodBody>,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            signature,
            body: RwLock::new(body),
        }
    }

    /// Returns a copy of the current body, `None` for abstract and extern methods.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the body lock was poisoned.
    pub fn body(&self) -> Result<Option<MethodBody>> {
        let body = self
            .body
            .read()
            .map_err(|e| Error::LockError(format!("method body of {}: {}", self.name, e)))?;
        Ok(body.clone())
    }

    /// Replaces the body.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the body lock was poisoned.
    pub fn set_body(&self, new_body: MethodBody) -> Result<()> {
        let mut body = self
            .body
            .write()
            .map_err(|e| Error::LockError(format!("method body of {}: {}", self.name, e)))?;
        *body = Some(new_body);
        Ok(())
    }
}

/// A row of the `Field` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declaring `TypeDef`
    pub declaring_type: Token,
    /// Field type
    pub signature: TypeSig,
}

/// Where a `TypeRef` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionScope {
    /// Defined in the referencing module itself
    Module,
    /// Defined in another module of the same assembly
    ModuleRef(Token),
    /// Defined in another assembly
    AssemblyRef(Token),
    /// Nested in another `TypeRef`
    TypeRef(Token),
}

/// A row of the `TypeRef` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Resolution scope
    pub scope: ResolutionScope,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
}

/// A row of the `MemberRef` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    /// Owning type: a `TypeRef`, `TypeDef` or `TypeSpec`
    pub parent: Token,
    /// Member name
    pub name: String,
    /// Member signature
    pub signature: MemberSig,
}

/// A row of the `MethodSpec` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    /// The generic method, a `MethodDef` or `MemberRef`
    pub method: Token,
    /// Generic method arguments
    pub instantiation: Vec<TypeSig>,
}

/// One loaded module.
#[derive(Debug)]
pub struct ModuleDef {
    /// Module name, e.g. `Crypto.dll`
    pub name: String,
    /// Module version id, the structural identity of the module
    pub mvid: Guid,
    /// Identity of the assembly this module is the manifest of
    pub assembly: Option<AssemblyName>,
    /// `TypeDef` rows
    pub types: Vec<TypeDef>,
    /// `MethodDef` rows
    pub methods: Vec<MethodDef>,
    /// `Field` rows
    pub fields: Vec<FieldDef>,
    /// `TypeRef` rows
    pub type_refs: Vec<TypeRef>,
    /// `MemberRef` rows
    pub member_refs: Vec<MemberRef>,
    /// `TypeSpec` rows
    pub type_specs: Vec<TypeSig>,
    /// `MethodSpec` rows
    pub method_specs: Vec<MethodSpec>,
    /// `AssemblyRef` rows
    pub assembly_refs: Vec<AssemblyName>,
    /// `ModuleRef` rows
    pub module_refs: Vec<String>,
    /// `#US` heap entries by heap offset
    pub user_strings: HashMap<u32, String>,
}

fn row<'a, T>(rows: &'a [T], token: Token, table: u8) -> Result<&'a T> {
    if !token.is_table(table) {
        return Err(Error::InvalidToken(token));
    }
    token
        .index()
        .and_then(|index| rows.get(index))
        .ok_or(Error::InvalidToken(token))
}

impl ModuleDef {
    /// Looks up a `TypeDef` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `TypeDef` token.
    pub fn type_def(&self, token: Token) -> Result<&TypeDef> {
        row(&self.types, token, Token::TYPE_DEF)
    }

    /// Looks up a `MethodDef` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `MethodDef` token.
    pub fn method_def(&self, token: Token) -> Result<&MethodDef> {
        row(&self.methods, token, Token::METHOD_DEF)
    }

    /// Looks up a `Field` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `Field` token.
    pub fn field_def(&self, token: Token) -> Result<&FieldDef> {
        row(&self.fields, token, Token::FIELD)
    }

    /// Looks up a `TypeRef` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `TypeRef` token.
    pub fn type_ref(&self, token: Token) -> Result<&TypeRef> {
        row(&self.type_refs, token, Token::TYPE_REF)
    }

    /// Looks up a `MemberRef` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `MemberRef` token.
    pub fn member_ref(&self, token: Token) -> Result<&MemberRef> {
        row(&self.member_refs, token, Token::MEMBER_REF)
    }

    /// Looks up a `TypeSpec` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `TypeSpec` token.
    pub fn type_spec(&self, token: Token) -> Result<&TypeSig> {
        row(&self.type_specs, token, Token::TYPE_SPEC)
    }

    /// Looks up a `MethodSpec` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `MethodSpec` token.
    pub fn method_spec(&self, token: Token) -> Result<&MethodSpec> {
        row(&self.method_specs, token, Token::METHOD_SPEC)
    }

    /// Looks up an `AssemblyRef` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a valid `AssemblyRef` token.
    pub fn assembly_ref(&self, token: Token) -> Result<&AssemblyName> {
        row(&self.assembly_refs, token, Token::ASSEMBLY_REF)
    }

    /// Looks up the literal of an `ldstr` token.
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<&str> {
        if !token.is_table(Token::USER_STRING) {
            return None;
        }
        self.user_strings.get(&token.row()).map(String::as_str)
    }

    /// Iterates over all `MethodDef` tokens.
    pub fn method_tokens(&self) -> impl Iterator<Item = Token> + '_ {
        (1..=self.methods.len()).map(|row| Token::from_parts(Token::METHOD_DEF, row as u32))
    }

    /// Finds a `TypeDef` by namespace and name; nested types are looked up within
    /// `enclosing`.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str, enclosing: Option<Token>) -> Option<Token> {
        self.types
            .iter()
            .position(|t| t.name == name && t.namespace == namespace && t.enclosing == enclosing)
            .map(|index| Token::from_parts(Token::TYPE_DEF, index as u32 + 1))
    }

    /// Full name of a `TypeDef`, `TypeRef` or `TypeSpec`, e.g. `Crypto.Outer/Inner`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] for tokens of other tables or dangling rows.
    pub fn type_full_name(&self, token: Token) -> Result<String> {
        match token.table() {
            Token::TYPE_DEF => {
                let def = self.type_def(token)?;
                match def.enclosing {
                    Some(outer) => Ok(format!("{}/{}", self.type_full_name(outer)?, def.name)),
                    None => Ok(qualified(&def.namespace, &def.name)),
                }
            }
            Token::TYPE_REF => {
                let reference = self.type_ref(token)?;
                match reference.scope {
                    ResolutionScope::TypeRef(outer) => Ok(format!(
                        "{}/{}",
                        self.type_full_name(outer)?,
                        reference.name
                    )),
                    _ => Ok(qualified(&reference.namespace, &reference.name)),
                }
            }
            Token::TYPE_SPEC => self.type_sig_name(self.type_spec(token)?),
            _ => Err(Error::InvalidToken(token)),
        }
    }

    /// Module-independent full name of a signature type.
    ///
    /// Two signatures from different modules denote the same type exactly when their names
    /// are equal.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if a referenced type token is dangling.
    pub fn type_sig_name(&self, sig: &TypeSig) -> Result<String> {
        if let Some(name) = sig.primitive_name() {
            return Ok(name.to_string());
        }
        Ok(match sig {
            TypeSig::Class(token) | TypeSig::ValueType(token) => self.type_full_name(*token)?,
            TypeSig::SzArray(element) => format!("{}[]", self.type_sig_name(element)?),
            TypeSig::Array { element, rank } => format!(
                "{}[{}]",
                self.type_sig_name(element)?,
                ",".repeat((*rank).saturating_sub(1) as usize)
            ),
            TypeSig::Ptr(element) => format!("{}*", self.type_sig_name(element)?),
            TypeSig::ByRef(element) => format!("{}&", self.type_sig_name(element)?),
            TypeSig::GenericInst { generic, args } => {
                let mut name = self.type_sig_name(generic)?;
                name.push('<');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        name.push(',');
                    }
                    name.push_str(&self.type_sig_name(arg)?);
                }
                name.push('>');
                name
            }
            TypeSig::Var(index) => format!("!{index}"),
            TypeSig::MVar(index) => format!("!!{index}"),
            _ => return Err(malformed_error!("Unnamed signature {:?}", sig)),
        })
    }

    /// Module-independent rendering of a method signature, e.g.
    /// `System.String(System.Int32,System.Int32)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if a referenced type token is dangling.
    pub fn method_sig_name(&self, sig: &MethodSig) -> Result<String> {
        let mut name = String::new();
        if sig.has_this {
            name.push_str("instance ");
        }
        name.push_str(&self.type_sig_name(&sig.ret)?);
        if sig.generic_params > 0 {
            let _ = write!(name, "`{}", sig.generic_params);
        }
        name.push('(');
        for (i, param) in sig.params.iter().enumerate() {
            if i > 0 {
                name.push(',');
            }
            name.push_str(&self.type_sig_name(param)?);
        }
        name.push(')');
        Ok(name)
    }

    /// Human-readable form of a method, field or member reference, used in diagnostics.
    ///
    /// Never fails: dangling rows are rendered by their raw token.
    #[must_use]
    pub fn member_display(&self, token: Token) -> String {
        self.try_member_display(token)
            .unwrap_or_else(|_| format!("<member {token}>"))
    }

    fn try_member_display(&self, token: Token) -> Result<String> {
        match token.table() {
            Token::METHOD_DEF => {
                let method = self.method_def(token)?;
                Ok(self.render_method(
                    &self.type_full_name(method.declaring_type)?,
                    &method.name,
                    &method.signature,
                )?)
            }
            Token::FIELD => {
                let field = self.field_def(token)?;
                Ok(format!(
                    "{} {}::{}",
                    self.type_sig_name(&field.signature)?,
                    self.type_full_name(field.declaring_type)?,
                    field.name
                ))
            }
            Token::MEMBER_REF => {
                let member = self.member_ref(token)?;
                let parent = self.type_full_name(member.parent)?;
                match &member.signature {
                    MemberSig::Method(sig) => self.render_method(&parent, &member.name, sig),
                    MemberSig::Field(sig) => Ok(format!(
                        "{} {}::{}",
                        self.type_sig_name(sig)?,
                        parent,
                        member.name
                    )),
                }
            }
            Token::METHOD_SPEC => {
                let spec = self.method_spec(token)?;
                let args = spec
                    .instantiation
                    .iter()
                    .map(|arg| self.type_sig_name(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "{}<{}>",
                    self.try_member_display(spec.method)?,
                    args.join(",")
                ))
            }
            _ => self.type_full_name(token),
        }
    }

    fn render_method(&self, parent: &str, name: &str, sig: &MethodSig) -> Result<String> {
        let params = sig
            .params
            .iter()
            .map(|p| self.type_sig_name(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "{} {}::{}({})",
            self.type_sig_name(&sig.ret)?,
            parent,
            name,
            params.join(",")
        ))
    }
}

fn qualified(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}
