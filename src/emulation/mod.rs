//! Symbolic execution of decrypter bodies.
//!
//! The engine evaluates a method over 32-bit [`SymbolicValue`]s, each either a known
//! constant or unknown. It is deliberately small:
//!
//! - [`InstructionEmulator`] applies straight-line semantics to a [`MachineState`]
//! - [`BranchEmulator`] picks successors, or reports that the decision depends on an
//!   unknown value
//! - [`MethodEvaluator`] drives both from entry to `ret` under a step budget
//!
//! A result that cannot be determined is an [`Evaluation::Skipped`] carrying a
//! [`SkipReason`], never an [`Error`](crate::Error).

mod branch;
mod emulator;
mod evaluator;
mod outcome;
mod state;
mod value;

pub use branch::{BranchEmulator, BranchOutcome};
pub use emulator::InstructionEmulator;
pub use evaluator::{MethodEvaluator, DEFAULT_MAX_STEPS};
pub use outcome::{Evaluation, SkipReason};
pub use state::MachineState;
pub use value::{BinaryOp, CompareOp, Conversion, SymbolicValue};
