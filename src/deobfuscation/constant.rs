//! Constants exchanged with decrypters.

use std::fmt;

use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::module::ModuleDef,
};

/// A constant argument to, or result of, a decrypter invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// 32-bit signed integer.
    I32(i32),

    /// 64-bit signed integer.
    I64(i64),

    /// 32-bit floating point.
    F32(f32),

    /// 64-bit floating point.
    F64(f64),

    /// String literal.
    String(String),

    /// Null reference.
    Null,
}

impl ConstValue {
    /// Returns `true` if this is the null constant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is a string literal.
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns the constant as an i32 if applicable.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string literal if applicable.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The shortest instruction that loads this constant.
    ///
    /// String literals are emitted as `ldstr` with an inline literal; the encoder allocates
    /// the user-string token when the body is written back.
    #[must_use]
    pub fn to_instruction(&self) -> Instruction {
        match self {
            Self::I32(v) => Instruction::ldc_i4(*v),
            Self::I64(v) => Instruction::ldc_i8(*v),
            Self::F32(v) => Instruction::ldc_r4(*v),
            Self::F64(v) => Instruction::ldc_r8(*v),
            Self::String(s) => Instruction::ldstr(s.clone()),
            Self::Null => Instruction::simple(OpCode::Ldnull),
        }
    }

    /// The constant loaded by `instruction`, if it is a constant load.
    ///
    /// `ldstr` operands holding a user-string token are looked up in `module`.
    #[must_use]
    pub fn from_instruction(module: &ModuleDef, instruction: &Instruction) -> Option<Self> {
        if let Some(value) = instruction.ldc_i4_value() {
            return Some(Self::I32(value));
        }

        match (instruction.opcode, &instruction.operand) {
            (OpCode::LdcI8, Operand::I64(v)) => Some(Self::I64(*v)),
            (OpCode::LdcR4, Operand::F32(v)) => Some(Self::F32(*v)),
            (OpCode::LdcR8, Operand::F64(v)) => Some(Self::F64(*v)),
            (OpCode::Ldnull, _) => Some(Self::Null),
            (OpCode::Ldstr, Operand::String(s)) => Some(Self::String(s.clone())),
            (OpCode::Ldstr, Operand::Token(token)) => {
                module.user_string(*token).map(|s| Self::String(s.to_string()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}L"),
            Self::F32(v) => write!(f, "{v}f"),
            Self::F64(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Null => write!(f, "null"),
        }
    }
}
