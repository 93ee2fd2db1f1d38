//! Resolved handles.
//!
//! A handle binds a metadata definition to the loaded module that owns it. Handles are
//! created once per `(module, token)` by [`ResolvedModule`] and shared through [`Arc`], so
//! two resolutions of the same definition compare pointer-equal.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use uguid::Guid;

use crate::{
    metadata::{
        module::{MethodDef, ModuleDef},
        signature::{SigWrapper, TypeSig},
        token::Token,
    },
    Result,
};

/// A `TypeDef` in a loaded module.
#[derive(Debug)]
pub struct TypeHandle {
    /// Owning module
    pub module: Arc<ModuleDef>,
    /// `TypeDef` token within `module`
    pub token: Token,
    /// Full name, e.g. `Crypto.Outer/Inner`
    pub full_name: String,
}

/// A `MethodDef` in a loaded module.
#[derive(Debug)]
pub struct MethodHandle {
    /// Owning module
    pub module: Arc<ModuleDef>,
    /// `MethodDef` token within `module`
    pub token: Token,
    /// Display form, e.g. `System.String Crypto.Strings::Get(System.Int32)`
    pub display: String,
}

impl MethodHandle {
    /// The method definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token no longer matches a row, which
    /// cannot happen for handles created by [`ResolvedModule`].
    pub fn def(&self) -> Result<&MethodDef> {
        self.module.method_def(self.token)
    }
}

/// A `Field` in a loaded module.
#[derive(Debug)]
pub struct FieldHandle {
    /// Owning module
    pub module: Arc<ModuleDef>,
    /// `Field` token within `module`
    pub token: Token,
    /// Display form, e.g. `System.Byte[] Crypto.Strings::Data`
    pub display: String,
}

macro_rules! impl_handle_identity {
    ($($handle:ty),*) => {
        $(
            impl PartialEq for $handle {
                fn eq(&self, other: &Self) -> bool {
                    self.module.mvid == other.module.mvid && self.token == other.token
                }
            }

            impl Eq for $handle {}
        )*
    };
}

impl_handle_identity!(TypeHandle, MethodHandle, FieldHandle);

/// A loaded module together with its handle caches.
#[derive(Debug)]
pub struct ResolvedModule {
    module: Arc<ModuleDef>,
    types: DashMap<Token, Arc<TypeHandle>>,
    methods: DashMap<Token, Arc<MethodHandle>>,
    fields: DashMap<Token, Arc<FieldHandle>>,
    pub(crate) type_refs: DashMap<Token, Arc<TypeHandle>>,
    pub(crate) method_refs: DashMap<Token, ResolvedMethod>,
}

impl ResolvedModule {
    /// Wraps a loaded module.
    #[must_use]
    pub fn new(module: Arc<ModuleDef>) -> Self {
        Self {
            module,
            types: DashMap::new(),
            methods: DashMap::new(),
            fields: DashMap::new(),
            type_refs: DashMap::new(),
            method_refs: DashMap::new(),
        }
    }

    /// The wrapped module.
    #[must_use]
    pub fn module(&self) -> &Arc<ModuleDef> {
        &self.module
    }

    /// The module's MVID.
    #[must_use]
    pub fn mvid(&self) -> Guid {
        self.module.mvid
    }

    /// The unique handle of a `TypeDef`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if `token` is not a `TypeDef` of this module.
    pub fn type_handle(&self, token: Token) -> Result<Arc<TypeHandle>> {
        if let Some(handle) = self.types.get(&token) {
            return Ok(handle.clone());
        }

        self.module.type_def(token)?;
        let handle = Arc::new(TypeHandle {
            module: self.module.clone(),
            token,
            full_name: self.module.type_full_name(token)?,
        });
        Ok(self.types.entry(token).or_insert(handle).clone())
    }

    /// The unique handle of a `MethodDef`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if `token` is not a `MethodDef` of this module.
    pub fn method_handle(&self, token: Token) -> Result<Arc<MethodHandle>> {
        if let Some(handle) = self.methods.get(&token) {
            return Ok(handle.clone());
        }

        self.module.method_def(token)?;
        let handle = Arc::new(MethodHandle {
            module: self.module.clone(),
            token,
            display: self.module.member_display(token),
        });
        Ok(self.methods.entry(token).or_insert(handle).clone())
    }

    /// The unique handle of a `Field`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if `token` is not a `Field` of this module.
    pub fn field_handle(&self, token: Token) -> Result<Arc<FieldHandle>> {
        if let Some(handle) = self.fields.get(&token) {
            return Ok(handle.clone());
        }

        self.module.field_def(token)?;
        let handle = Arc::new(FieldHandle {
            module: self.module.clone(),
            token,
            display: self.module.member_display(token),
        });
        Ok(self.fields.entry(token).or_insert(handle).clone())
    }
}

/// A fully resolved type, with the construction its signature implied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedType {
    /// A type definition
    Definition(Arc<TypeHandle>),
    /// A built-in type
    Primitive(TypeSig),
    /// `T[]`
    SzArray(Box<ResolvedType>),
    /// `T[,...]`
    Array {
        /// Element type
        element: Box<ResolvedType>,
        /// Number of dimensions
        rank: u32,
    },
    /// `T*`
    Pointer(Box<ResolvedType>),
    /// `T&`
    ByRef(Box<ResolvedType>),
    /// A generic type instantiated with concrete arguments
    GenericInstance {
        /// The generic type definition
        definition: Arc<TypeHandle>,
        /// Resolved type arguments
        args: Vec<ResolvedType>,
    },
    /// An unbound generic parameter
    GenericParameter {
        /// Parameter of the method (`!!n`) rather than the type (`!n`)
        method: bool,
        /// Parameter position
        index: u32,
    },
}

impl ResolvedType {
    /// The type definition behind a definition or generic instance.
    #[must_use]
    pub fn definition(&self) -> Option<&Arc<TypeHandle>> {
        match self {
            ResolvedType::Definition(handle) => Some(handle),
            ResolvedType::GenericInstance { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Wraps this type in one construction layer.
    #[must_use]
    pub fn wrap(self, wrapper: SigWrapper) -> Self {
        match wrapper {
            SigWrapper::SzArray => ResolvedType::SzArray(Box::new(self)),
            SigWrapper::Array(rank) => ResolvedType::Array {
                element: Box::new(self),
                rank,
            },
            SigWrapper::Ptr => ResolvedType::Pointer(Box::new(self)),
            SigWrapper::ByRef => ResolvedType::ByRef(Box::new(self)),
        }
    }

    /// Returns true for the built-in `System.String`.
    #[must_use]
    pub fn is_string(&self) -> bool {
        match self {
            ResolvedType::Primitive(sig) => *sig == TypeSig::String,
            ResolvedType::Definition(handle) => handle.full_name == "System.String",
            _ => false,
        }
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Definition(handle) => write!(f, "{}", handle.full_name),
            ResolvedType::Primitive(sig) => {
                write!(f, "{}", sig.primitive_name().unwrap_or("<primitive>"))
            }
            ResolvedType::SzArray(element) => write!(f, "{element}[]"),
            ResolvedType::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat((*rank).saturating_sub(1) as usize))
            }
            ResolvedType::Pointer(element) => write!(f, "{element}*"),
            ResolvedType::ByRef(element) => write!(f, "{element}&"),
            ResolvedType::GenericInstance { definition, args } => {
                write!(f, "{}<", definition.full_name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            ResolvedType::GenericParameter { method: true, index } => write!(f, "!!{index}"),
            ResolvedType::GenericParameter { method: false, index } => write!(f, "!{index}"),
        }
    }
}

/// A method reference bound to its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    /// The method definition
    pub handle: Arc<MethodHandle>,
    /// The declaring type as referenced, including any type instantiation
    pub declaring_type: ResolvedType,
    /// Generic method arguments of a `MethodSpec`
    pub generic_args: Vec<ResolvedType>,
}

/// A field reference bound to its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// The field definition
    pub handle: Arc<FieldHandle>,
    /// The declaring type as referenced
    pub declaring_type: ResolvedType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{builder::ModuleBuilder, signature::MethodSig};

    fn module() -> Arc<ModuleDef> {
        let mut builder = ModuleBuilder::new("Handles.dll");
        let ty = builder.add_type("Crypto", "Strings");
        builder.add_method(ty, "Get", MethodSig::new_static(TypeSig::String, vec![]), None);
        builder.add_field(ty, "Data", TypeSig::sz_array(TypeSig::U1));
        Arc::new(builder.build())
    }

    #[test]
    fn test_handles_are_unique() {
        let resolved = ResolvedModule::new(module());

        let a = resolved.type_handle(Token::new(0x02000001)).unwrap();
        let b = resolved.type_handle(Token::new(0x02000001)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.full_name, "Crypto.Strings");

        let m1 = resolved.method_handle(Token::new(0x06000001)).unwrap();
        let m2 = resolved.method_handle(Token::new(0x06000001)).unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
        assert_eq!(m1.def().unwrap().name, "Get");

        let f = resolved.field_handle(Token::new(0x04000001)).unwrap();
        assert_eq!(f.display, "System.Byte[] Crypto.Strings::Data");
    }

    #[test]
    fn test_invalid_tokens() {
        let resolved = ResolvedModule::new(module());
        assert!(resolved.type_handle(Token::new(0x02000002)).is_err());
        assert!(resolved.method_handle(Token::new(0x02000001)).is_err());
        assert!(resolved.field_handle(Token::new(0x04000005)).is_err());
    }

    #[test]
    fn test_wrap_and_display() {
        let resolved = ResolvedModule::new(module());
        let handle = resolved.type_handle(Token::new(0x02000001)).unwrap();

        let ty = ResolvedType::Definition(handle)
            .wrap(SigWrapper::Ptr)
            .wrap(SigWrapper::SzArray)
            .wrap(SigWrapper::ByRef);
        assert_eq!(ty.to_string(), "Crypto.Strings*[]&");
        assert!(ty.definition().is_none());

        let param = ResolvedType::GenericParameter {
            method: true,
            index: 1,
        }
        .wrap(SigWrapper::Array(2));
        assert_eq!(param.to_string(), "!!1[,]");
        assert!(ResolvedType::Primitive(TypeSig::String).is_string());
    }
}
