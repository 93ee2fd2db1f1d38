//! Symbolic 32-bit values.

use std::fmt;

/// An int32 evaluation slot: either a known constant or unknown.
///
/// All arithmetic is signed 32-bit, wrapping two's complement, as on the CLR. An unknown
/// operand always yields an unknown result, even where the other operand would decide it
/// (`x * 0`, `x & 0`): values are only ever derived from what was actually computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolicValue {
    /// Nothing is known about the value
    #[default]
    Unknown,
    /// The value is this constant
    Known(i32),
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `mul`
    Mul,
    /// `div`
    Div,
    /// `div.un`
    DivUn,
    /// `rem`
    Rem,
    /// `rem.un`
    RemUn,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
    /// `shl`
    Shl,
    /// `shr`
    Shr,
    /// `shr.un`
    ShrUn,
}

/// Comparison operators producing 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `ceq`
    Eq,
    /// `clt`
    Lt,
    /// `cgt`
    Gt,
    /// `clt.un`
    LtUn,
    /// `cgt.un`
    GtUn,
}

/// Narrowing conversions that stay within int32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    /// `conv.i1`
    I1,
    /// `conv.u1`
    U1,
    /// `conv.i2`
    I2,
    /// `conv.u2`
    U2,
    /// `conv.i4`, `conv.u4`
    I4,
}

impl SymbolicValue {
    /// The constant, if known.
    #[must_use]
    pub fn known(self) -> Option<i32> {
        match self {
            SymbolicValue::Known(value) => Some(value),
            SymbolicValue::Unknown => None,
        }
    }

    /// Returns true for a known constant.
    #[must_use]
    pub fn is_known(self) -> bool {
        matches!(self, SymbolicValue::Known(_))
    }

    fn lift(self, rhs: Self, f: impl FnOnce(i32, i32) -> i32) -> Self {
        match (self, rhs) {
            (SymbolicValue::Known(a), SymbolicValue::Known(b)) => SymbolicValue::Known(f(a, b)),
            _ => SymbolicValue::Unknown,
        }
    }

    fn lift_unary(self, f: impl FnOnce(i32) -> i32) -> Self {
        match self {
            SymbolicValue::Known(a) => SymbolicValue::Known(f(a)),
            SymbolicValue::Unknown => SymbolicValue::Unknown,
        }
    }

    /// `self + rhs`
    #[must_use]
    pub fn add(self, rhs: Self) -> Self {
        self.lift(rhs, i32::wrapping_add)
    }

    /// `self - rhs`
    #[must_use]
    pub fn sub(self, rhs: Self) -> Self {
        self.lift(rhs, i32::wrapping_sub)
    }

    /// `self * rhs`
    #[must_use]
    pub fn mul(self, rhs: Self) -> Self {
        self.lift(rhs, i32::wrapping_mul)
    }

    /// `self & rhs`
    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| a & b)
    }

    /// `self | rhs`
    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| a | b)
    }

    /// `self ^ rhs`
    #[must_use]
    pub fn xor(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| a ^ b)
    }

    /// `self << rhs`; the shift amount is masked to five bits.
    #[must_use]
    pub fn shl(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| a.wrapping_shl(b as u32))
    }

    /// Arithmetic `self >> rhs`.
    #[must_use]
    pub fn shr(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| a.wrapping_shr(b as u32))
    }

    /// Logical `self >> rhs`.
    #[must_use]
    pub fn shr_un(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| (a as u32).wrapping_shr(b as u32) as i32)
    }

    /// `~self`
    #[must_use]
    pub fn not(self) -> Self {
        self.lift_unary(|a| !a)
    }

    /// `-self`
    #[must_use]
    pub fn neg(self) -> Self {
        self.lift_unary(i32::wrapping_neg)
    }

    /// `self == rhs` as 0 or 1.
    #[must_use]
    pub fn compare_eq(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| i32::from(a == b))
    }

    /// Signed `self < rhs` as 0 or 1.
    #[must_use]
    pub fn compare_lt(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| i32::from(a < b))
    }

    /// Signed `self > rhs` as 0 or 1.
    #[must_use]
    pub fn compare_gt(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| i32::from(a > b))
    }

    /// Unsigned `self < rhs` as 0 or 1.
    #[must_use]
    pub fn compare_lt_un(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| i32::from((a as u32) < (b as u32)))
    }

    /// Unsigned `self > rhs` as 0 or 1.
    #[must_use]
    pub fn compare_gt_un(self, rhs: Self) -> Self {
        self.lift(rhs, |a, b| i32::from((a as u32) > (b as u32)))
    }

    /// Applies a binary operator.
    ///
    /// Returns `None` when the operation would raise at runtime: division or remainder by
    /// zero, and `i32::MIN / -1`.
    #[must_use]
    pub fn binary(self, op: BinaryOp, rhs: Self) -> Option<Self> {
        let checked = |f: fn(i32, i32) -> Option<i32>| match (self, rhs) {
            (SymbolicValue::Known(a), SymbolicValue::Known(b)) => f(a, b).map(SymbolicValue::Known),
            _ => Some(SymbolicValue::Unknown),
        };

        match op {
            BinaryOp::Add => Some(self.add(rhs)),
            BinaryOp::Sub => Some(self.sub(rhs)),
            BinaryOp::Mul => Some(self.mul(rhs)),
            BinaryOp::Div => checked(i32::checked_div),
            BinaryOp::Rem => checked(i32::checked_rem),
            BinaryOp::DivUn => {
                checked(|a, b| (a as u32).checked_div(b as u32).map(|r| r as i32))
            }
            BinaryOp::RemUn => {
                checked(|a, b| (a as u32).checked_rem(b as u32).map(|r| r as i32))
            }
            BinaryOp::And => Some(self.and(rhs)),
            BinaryOp::Or => Some(self.or(rhs)),
            BinaryOp::Xor => Some(self.xor(rhs)),
            BinaryOp::Shl => Some(self.shl(rhs)),
            BinaryOp::Shr => Some(self.shr(rhs)),
            BinaryOp::ShrUn => Some(self.shr_un(rhs)),
        }
    }

    /// Applies a comparison operator.
    #[must_use]
    pub fn compare(self, op: CompareOp, rhs: Self) -> Self {
        match op {
            CompareOp::Eq => self.compare_eq(rhs),
            CompareOp::Lt => self.compare_lt(rhs),
            CompareOp::Gt => self.compare_gt(rhs),
            CompareOp::LtUn => self.compare_lt_un(rhs),
            CompareOp::GtUn => self.compare_gt_un(rhs),
        }
    }

    /// Truncates and re-extends the value as the conversion opcode would.
    #[must_use]
    pub fn convert(self, conversion: Conversion) -> Self {
        self.lift_unary(|a| match conversion {
            Conversion::I1 => i32::from(a as i8),
            Conversion::U1 => i32::from(a as u8),
            Conversion::I2 => i32::from(a as i16),
            Conversion::U2 => i32::from(a as u16),
            Conversion::I4 => a,
        })
    }
}

impl From<i32> for SymbolicValue {
    fn from(value: i32) -> Self {
        SymbolicValue::Known(value)
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicValue::Known(value) => write!(f, "{value}"),
            SymbolicValue::Unknown => write!(f, "?"),
        }
    }
}
