//! Results of symbolic evaluation.

use std::fmt;

use crate::assembly::OpCode;

/// Why a decrypter body could not be evaluated to a constant.
///
/// This is a tagged result, not an error: a skipped evaluation leaves its call site unchanged
/// and is only counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// A conditional branch or switch depended on an unknown value
    UnknownBranch,
    /// `ret` returned an unknown value
    UnknownReturn,
    /// The method does not return a 32-bit integral value
    NonIntegralReturn,
    /// The step budget ran out, typically in a loop
    BudgetExhausted,
    /// The body contains an instruction the emulator does not model
    Unmodeled(OpCode),
    /// An instruction popped from an empty evaluation stack
    StackUnderflow,
    /// An argument or local index outside the method's slots
    InvalidVariable(u16),
    /// Arithmetic that raises at runtime (division by zero, `int.MinValue / -1`)
    ArithmeticFault,
    /// Execution ran past the last instruction
    FellThrough,
    /// The method has no IL body
    NoBody,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownBranch => write!(f, "branch on unknown value"),
            SkipReason::UnknownReturn => write!(f, "unknown return value"),
            SkipReason::NonIntegralReturn => write!(f, "non-integral return type"),
            SkipReason::BudgetExhausted => write!(f, "step budget exhausted"),
            SkipReason::Unmodeled(opcode) => write!(f, "unmodeled instruction {}", opcode.mnemonic()),
            SkipReason::StackUnderflow => write!(f, "evaluation stack underflow"),
            SkipReason::InvalidVariable(index) => write!(f, "invalid variable index {index}"),
            SkipReason::ArithmeticFault => write!(f, "arithmetic fault"),
            SkipReason::FellThrough => write!(f, "fell through end of body"),
            SkipReason::NoBody => write!(f, "method has no body"),
        }
    }
}

/// The outcome of evaluating one decrypter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// The invocation returns a known constant
    Known {
        /// The returned value
        value: i32,
        /// Instructions executed
        steps: usize,
    },
    /// The result could not be determined
    Skipped {
        /// Why evaluation stopped
        reason: SkipReason,
        /// Instructions executed before stopping
        steps: usize,
    },
}

impl Evaluation {
    /// The computed value, if any.
    #[must_use]
    pub fn value(&self) -> Option<i32> {
        match self {
            Evaluation::Known { value, .. } => Some(*value),
            Evaluation::Skipped { .. } => None,
        }
    }

    /// The skip reason, if evaluation did not produce a value.
    #[must_use]
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Evaluation::Known { .. } => None,
            Evaluation::Skipped { reason, .. } => Some(*reason),
        }
    }

    /// Number of instructions executed.
    #[must_use]
    pub fn steps(&self) -> usize {
        match self {
            Evaluation::Known { steps, .. } | Evaluation::Skipped { steps, .. } => *steps,
        }
    }
}
