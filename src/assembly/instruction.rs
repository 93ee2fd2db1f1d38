//! Decoded CIL instructions.
//!
//! Branch operands hold instruction *indices* rather than byte offsets, so instructions can be
//! inserted and removed without re-encoding. The [`encoder`](crate::assembly::encoder)
//! computes byte offsets again when a body is serialized.

use std::fmt;

use crate::{
    assembly::opcode::{FlowType, OpCode},
    metadata::token::Token,
};

/// The inline operand of an [`Instruction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 32-bit integer immediate (`ldc.i4`, `ldc.i4.s`)
    I32(i32),
    /// 64-bit integer immediate (`ldc.i8`)
    I64(i64),
    /// 32-bit float immediate (`ldc.r4`)
    F32(f32),
    /// 64-bit float immediate (`ldc.r8`)
    F64(f64),
    /// Argument or local index
    Var(u16),
    /// Metadata token, or a `#US` token for an `ldstr` that was decoded but not rewritten
    Token(Token),
    /// String literal of an `ldstr`; the encoder allocates its `#US` token
    String(String),
    /// Branch target as instruction index
    Target(usize),
    /// Switch table as instruction indices
    Switch(Vec<usize>),
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The inline operand
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction from opcode and operand.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Creates an instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Creates an instruction with a token operand.
    #[must_use]
    pub fn token(opcode: OpCode, token: Token) -> Self {
        Self::new(opcode, Operand::Token(token))
    }

    /// Creates a branch to the instruction at `target`.
    #[must_use]
    pub fn branch(opcode: OpCode, target: usize) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    /// Creates the shortest encoding that loads the 32-bit constant `value`.
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        let opcode = match value {
            -1 => OpCode::LdcI4M1,
            0 => OpCode::LdcI4_0,
            1 => OpCode::LdcI4_1,
            2 => OpCode::LdcI4_2,
            3 => OpCode::LdcI4_3,
            4 => OpCode::LdcI4_4,
            5 => OpCode::LdcI4_5,
            6 => OpCode::LdcI4_6,
            7 => OpCode::LdcI4_7,
            8 => OpCode::LdcI4_8,
            v if i8::try_from(v).is_ok() => return Self::new(OpCode::LdcI4S, Operand::I32(v)),
            v => return Self::new(OpCode::LdcI4, Operand::I32(v)),
        };
        Self::simple(opcode)
    }

    /// Creates an `ldc.i8`.
    #[must_use]
    pub fn ldc_i8(value: i64) -> Self {
        Self::new(OpCode::LdcI8, Operand::I64(value))
    }

    /// Creates an `ldc.r4`.
    #[must_use]
    pub fn ldc_r4(value: f32) -> Self {
        Self::new(OpCode::LdcR4, Operand::F32(value))
    }

    /// Creates an `ldc.r8`.
    #[must_use]
    pub fn ldc_r8(value: f64) -> Self {
        Self::new(OpCode::LdcR8, Operand::F64(value))
    }

    /// Creates an `ldstr` carrying its literal.
    #[must_use]
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::new(OpCode::Ldstr, Operand::String(value.into()))
    }

    /// Creates the shortest encoding of a load of argument `index`.
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        match index {
            0 => Self::simple(OpCode::Ldarg0),
            1 => Self::simple(OpCode::Ldarg1),
            2 => Self::simple(OpCode::Ldarg2),
            3 => Self::simple(OpCode::Ldarg3),
            i if i <= 0xFF => Self::new(OpCode::LdargS, Operand::Var(i)),
            i => Self::new(OpCode::Ldarg, Operand::Var(i)),
        }
    }

    /// Creates the shortest encoding of a load of local `index`.
    #[must_use]
    pub fn ldloc(index: u16) -> Self {
        match index {
            0 => Self::simple(OpCode::Ldloc0),
            1 => Self::simple(OpCode::Ldloc1),
            2 => Self::simple(OpCode::Ldloc2),
            3 => Self::simple(OpCode::Ldloc3),
            i if i <= 0xFF => Self::new(OpCode::LdlocS, Operand::Var(i)),
            i => Self::new(OpCode::Ldloc, Operand::Var(i)),
        }
    }

    /// Creates the shortest encoding of a store to local `index`.
    #[must_use]
    pub fn stloc(index: u16) -> Self {
        match index {
            0 => Self::simple(OpCode::Stloc0),
            1 => Self::simple(OpCode::Stloc1),
            2 => Self::simple(OpCode::Stloc2),
            3 => Self::simple(OpCode::Stloc3),
            i if i <= 0xFF => Self::new(OpCode::StlocS, Operand::Var(i)),
            i => Self::new(OpCode::Stloc, Operand::Var(i)),
        }
    }

    /// Returns the constant pushed by any `ldc.i4` form.
    #[must_use]
    pub fn ldc_i4_value(&self) -> Option<i32> {
        match self.opcode {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI4_0 => Some(0),
            OpCode::LdcI4_1 => Some(1),
            OpCode::LdcI4_2 => Some(2),
            OpCode::LdcI4_3 => Some(3),
            OpCode::LdcI4_4 => Some(4),
            OpCode::LdcI4_5 => Some(5),
            OpCode::LdcI4_6 => Some(6),
            OpCode::LdcI4_7 => Some(7),
            OpCode::LdcI4_8 => Some(8),
            OpCode::LdcI4S | OpCode::LdcI4 => match self.operand {
                Operand::I32(value) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the argument index read by any `ldarg` form.
    #[must_use]
    pub fn ldarg_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            OpCode::LdargS | OpCode::Ldarg => self.var(),
            _ => None,
        }
    }

    /// Returns the argument index written by any `starg` form.
    #[must_use]
    pub fn starg_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::StargS | OpCode::Starg => self.var(),
            _ => None,
        }
    }

    /// Returns the local index read by any `ldloc` form.
    #[must_use]
    pub fn ldloc_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldloc0 => Some(0),
            OpCode::Ldloc1 => Some(1),
            OpCode::Ldloc2 => Some(2),
            OpCode::Ldloc3 => Some(3),
            OpCode::LdlocS | OpCode::Ldloc => self.var(),
            _ => None,
        }
    }

    /// Returns the local index written by any `stloc` form.
    #[must_use]
    pub fn stloc_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Stloc0 => Some(0),
            OpCode::Stloc1 => Some(1),
            OpCode::Stloc2 => Some(2),
            OpCode::Stloc3 => Some(3),
            OpCode::StlocS | OpCode::Stloc => self.var(),
            _ => None,
        }
    }

    fn var(&self) -> Option<u16> {
        match self.operand {
            Operand::Var(index) => Some(index),
            _ => None,
        }
    }

    /// Returns the token operand, if any.
    #[must_use]
    pub fn token_operand(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// The control-flow class of the opcode.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Returns true for `call` and `callvirt`.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.opcode, OpCode::Call | OpCode::Callvirt)
    }

    /// Every explicit branch target, in operand order.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Rewrites every branch target through `map`.
    pub fn map_targets(&mut self, mut map: impl FnMut(usize) -> usize) {
        match &mut self.operand {
            Operand::Target(target) => *target = map(*target),
            Operand::Switch(targets) => {
                for target in targets.iter_mut() {
                    *target = map(*target);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::I32(value) => write!(f, " {value}"),
            Operand::I64(value) => write!(f, " {value}"),
            Operand::F32(value) => write!(f, " {value}"),
            Operand::F64(value) => write!(f, " {value}"),
            Operand::Var(index) => write!(f, " V_{index}"),
            Operand::Token(token) => write!(f, " {token}"),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Target(target) => write!(f, " IL_{target:04}"),
            Operand::Switch(targets) => {
                let labels: Vec<String> = targets.iter().map(|t| format!("IL_{t:04}")).collect();
                write!(f, " ({})", labels.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldc_i4_picks_shortest_form() {
        assert_eq!(Instruction::ldc_i4(-1).opcode, OpCode::LdcI4M1);
        assert_eq!(Instruction::ldc_i4(7).opcode, OpCode::LdcI4_7);
        assert_eq!(Instruction::ldc_i4(11).opcode, OpCode::LdcI4S);
        assert_eq!(Instruction::ldc_i4(-128).opcode, OpCode::LdcI4S);
        assert_eq!(Instruction::ldc_i4(128).opcode, OpCode::LdcI4);

        for value in [-200, -1, 0, 5, 8, 9, 127, 1_000_000, i32::MIN] {
            assert_eq!(Instruction::ldc_i4(value).ldc_i4_value(), Some(value));
        }
    }

    #[test]
    fn test_variable_indices() {
        assert_eq!(Instruction::ldarg(2).ldarg_index(), Some(2));
        assert_eq!(Instruction::ldarg(40).ldarg_index(), Some(40));
        assert_eq!(Instruction::ldarg(400).opcode, OpCode::Ldarg);
        assert_eq!(Instruction::ldloc(3).ldloc_index(), Some(3));
        assert_eq!(Instruction::stloc(9).stloc_index(), Some(9));
        assert_eq!(
            Instruction::new(OpCode::StargS, Operand::Var(1)).starg_index(),
            Some(1)
        );
        assert_eq!(Instruction::ldloc(0).ldarg_index(), None);
    }

    #[test]
    fn test_map_targets() {
        let mut switch = Instruction::new(OpCode::Switch, Operand::Switch(vec![1, 4, 2]));
        switch.map_targets(|t| t * 10);
        assert_eq!(switch.branch_targets(), vec![10, 40, 20]);

        let mut br = Instruction::branch(OpCode::BrS, 3);
        br.map_targets(|t| t + 1);
        assert_eq!(br.branch_targets(), vec![4]);

        assert!(Instruction::simple(OpCode::Ret).branch_targets().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::ldc_i4(11).to_string(), "ldc.i4.s 11");
        assert_eq!(Instruction::ldstr("abc").to_string(), "ldstr \"abc\"");
        assert_eq!(
            Instruction::token(OpCode::Call, Token::new(0x06000002)).to_string(),
            "call 0x06000002"
        );
        assert_eq!(
            Instruction::new(OpCode::Switch, Operand::Switch(vec![1, 2])).to_string(),
            "switch (IL_0001, IL_0002)"
        );
    }
}
