//! Type, method and field signatures.
//!
//! Signatures reference other metadata through module-relative tokens, so a [`TypeSig`] only
//! has meaning together with the module it was read from. Use
//! [`ModuleDef::type_sig_name`](crate::metadata::module::ModuleDef::type_sig_name) to obtain
//! the module-independent full name used for display and for cross-module comparison.

use crate::metadata::token::Token;

/// A type as it appears in a signature blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `int8`
    I1,
    /// `unsigned int8`
    U1,
    /// `int16`
    I2,
    /// `unsigned int16`
    U2,
    /// `int32`
    I4,
    /// `unsigned int32`
    U4,
    /// `int64`
    I8,
    /// `unsigned int64`
    U8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `native int`
    I,
    /// `native unsigned int`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// `typedref`
    TypedByRef,
    /// Reference type named by a `TypeDef` or `TypeRef` token
    Class(Token),
    /// Value type named by a `TypeDef` or `TypeRef` token
    ValueType(Token),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array
    Array {
        /// Element type
        element: Box<TypeSig>,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Managed reference
    ByRef(Box<TypeSig>),
    /// Instantiation of a generic type
    GenericInst {
        /// The generic type definition (a `Class` or `ValueType`)
        generic: Box<TypeSig>,
        /// Type arguments
        args: Vec<TypeSig>,
    },
    /// Generic parameter of the enclosing type (`!n`)
    Var(u32),
    /// Generic parameter of the enclosing method (`!!n`)
    MVar(u32),
}

/// One layer of construction wrapped around an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigWrapper {
    /// `T[]`
    SzArray,
    /// `T[,...]`
    Array(u32),
    /// `T*`
    Ptr,
    /// `T&`
    ByRef,
}

impl TypeSig {
    /// Returns the full name of a built-in type, or `None` for non-primitive signatures.
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            TypeSig::Void => "System.Void",
            TypeSig::Boolean => "System.Boolean",
            TypeSig::Char => "System.Char",
            TypeSig::I1 => "System.SByte",
            TypeSig::U1 => "System.Byte",
            TypeSig::I2 => "System.Int16",
            TypeSig::U2 => "System.UInt16",
            TypeSig::I4 => "System.Int32",
            TypeSig::U4 => "System.UInt32",
            TypeSig::I8 => "System.Int64",
            TypeSig::U8 => "System.UInt64",
            TypeSig::R4 => "System.Single",
            TypeSig::R8 => "System.Double",
            TypeSig::I => "System.IntPtr",
            TypeSig::U => "System.UIntPtr",
            TypeSig::String => "System.String",
            TypeSig::Object => "System.Object",
            TypeSig::TypedByRef => "System.TypedReference",
            _ => return None,
        })
    }

    /// Returns true for the built-in types that need no metadata lookup.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.primitive_name().is_some()
    }

    /// Returns the type token of a `Class` or `ValueType` signature.
    #[must_use]
    pub fn type_token(&self) -> Option<Token> {
        match self {
            TypeSig::Class(token) | TypeSig::ValueType(token) => Some(*token),
            _ => None,
        }
    }

    /// Splits the signature into its construction wrappers and innermost element type.
    ///
    /// Wrappers are returned outermost first, so `int32*[]&` yields
    /// `[ByRef, SzArray, Ptr]` and `int32`. Re-applying the wrappers in reverse order
    /// rebuilds the original type from the inside out.
    #[must_use]
    pub fn peel(&self) -> (Vec<SigWrapper>, &TypeSig) {
        let mut wrappers = Vec::new();
        let mut current = self;
        loop {
            current = match current {
                TypeSig::SzArray(inner) => {
                    wrappers.push(SigWrapper::SzArray);
                    inner
                }
                TypeSig::Array { element, rank } => {
                    wrappers.push(SigWrapper::Array(*rank));
                    element
                }
                TypeSig::Ptr(inner) => {
                    wrappers.push(SigWrapper::Ptr);
                    inner
                }
                TypeSig::ByRef(inner) => {
                    wrappers.push(SigWrapper::ByRef);
                    inner
                }
                _ => return (wrappers, current),
            };
        }
    }

    /// Convenience constructor for `T[]`.
    #[must_use]
    pub fn sz_array(element: TypeSig) -> Self {
        TypeSig::SzArray(Box::new(element))
    }

    /// Convenience constructor for `T&`.
    #[must_use]
    pub fn by_ref(element: TypeSig) -> Self {
        TypeSig::ByRef(Box::new(element))
    }

    /// Convenience constructor for `T*`.
    #[must_use]
    pub fn ptr(element: TypeSig) -> Self {
        TypeSig::Ptr(Box::new(element))
    }

    /// Convenience constructor for a generic instantiation.
    #[must_use]
    pub fn generic_inst(generic: TypeSig, args: Vec<TypeSig>) -> Self {
        TypeSig::GenericInst {
            generic: Box::new(generic),
            args,
        }
    }
}

/// A method signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Instance method: argument 0 is the implicit `this`
    pub has_this: bool,
    /// Number of generic method parameters
    pub generic_params: u32,
    /// Return type
    pub ret: TypeSig,
    /// Declared parameters, excluding `this`
    pub params: Vec<TypeSig>,
}

impl MethodSig {
    /// Creates a static method signature.
    #[must_use]
    pub fn new_static(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        Self {
            has_this: false,
            generic_params: 0,
            ret,
            params,
        }
    }

    /// Creates an instance method signature.
    #[must_use]
    pub fn new_instance(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        Self {
            has_this: true,
            generic_params: 0,
            ret,
            params,
        }
    }

    /// Sets the number of generic method parameters.
    #[must_use]
    pub fn with_generic_params(mut self, count: u32) -> Self {
        self.generic_params = count;
        self
    }

    /// Number of argument slots a call consumes, including `this`.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }
}

/// Signature of a `MemberRef` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberSig {
    /// A method reference
    Method(MethodSig),
    /// A field reference
    Field(TypeSig),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peel_orders_outermost_first() {
        let sig = TypeSig::by_ref(TypeSig::sz_array(TypeSig::ptr(TypeSig::I4)));
        let (wrappers, leaf) = sig.peel();

        assert_eq!(
            wrappers,
            vec![SigWrapper::ByRef, SigWrapper::SzArray, SigWrapper::Ptr]
        );
        assert_eq!(leaf, &TypeSig::I4);
    }

    #[test]
    fn test_peel_stops_at_generic_instance() {
        let inst = TypeSig::generic_inst(
            TypeSig::Class(Token::new(0x01000001)),
            vec![TypeSig::sz_array(TypeSig::String)],
        );
        let sig = TypeSig::Array {
            element: Box::new(inst.clone()),
            rank: 2,
        };
        let (wrappers, leaf) = sig.peel();

        assert_eq!(wrappers, vec![SigWrapper::Array(2)]);
        assert_eq!(leaf, &inst);
    }

    #[test]
    fn test_arg_count() {
        let sig = MethodSig::new_static(TypeSig::String, vec![TypeSig::I4, TypeSig::I4]);
        assert_eq!(sig.arg_count(), 2);

        let sig = MethodSig::new_instance(TypeSig::String, vec![TypeSig::I4]);
        assert_eq!(sig.arg_count(), 2);
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(TypeSig::I4.primitive_name(), Some("System.Int32"));
        assert_eq!(TypeSig::String.primitive_name(), Some("System.String"));
        assert!(TypeSig::Class(Token::new(0x02000001)).primitive_name().is_none());
        assert!(!TypeSig::Var(0).is_primitive());
    }
}
