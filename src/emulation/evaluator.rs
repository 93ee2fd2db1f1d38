//! Bounded symbolic evaluation of whole method bodies.

use crate::{
    assembly::{MethodBody, OpCode},
    emulation::{
        branch::{BranchEmulator, BranchOutcome},
        emulator::InstructionEmulator,
        outcome::{Evaluation, SkipReason},
        value::SymbolicValue,
    },
    metadata::{module::MethodDef, signature::TypeSig},
    Result,
};

/// Default number of instructions a single evaluation may execute.
pub const DEFAULT_MAX_STEPS: usize = 50;

/// Runs a method body from entry to `ret` over symbolic values.
///
/// The evaluator owns the dispatch loop: branch-class opcodes go to the
/// [`BranchEmulator`], `ret` yields the top of the stack, everything else goes to the
/// [`InstructionEmulator`]. Evaluation stops with [`SkipReason::BudgetExhausted`] once
/// `max_steps` instructions have run without reaching `ret`.
///
/// # Examples
///
/// ```rust
/// use dotinline::assembly::{Instruction, MethodBody, OpCode};
/// use dotinline::emulation::{MethodEvaluator, SymbolicValue};
/// use dotinline::metadata::{module::MethodDef, signature::{MethodSig, TypeSig}, token::Token};
///
/// // x * 2 + 1
/// let body = MethodBody::new(vec![
///     Instruction::ldarg(0),
///     Instruction::ldc_i4(2),
///     Instruction::simple(OpCode::Mul),
///     Instruction::ldc_i4(1),
///     Instruction::simple(OpCode::Add),
///     Instruction::simple(OpCode::Ret),
/// ]);
/// let method = MethodDef::new(
///     "F",
///     Token::new(0x02000001),
///     MethodSig::new_static(TypeSig::I4, vec![TypeSig::I4]),
///     None,
/// );
///
/// let evaluation = MethodEvaluator::default()
///     .evaluate_body(&method, &body, &[SymbolicValue::Known(5)]);
/// assert_eq!(evaluation.value(), Some(11));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MethodEvaluator {
    max_steps: usize,
}

impl Default for MethodEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl MethodEvaluator {
    /// Creates an evaluator with the given step budget.
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// The step budget.
    #[must_use]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Evaluates `method`'s current body with the given leading arguments.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the method body lock was poisoned. Every other
    /// failure is reported as [`Evaluation::Skipped`].
    pub fn evaluate(&self, method: &MethodDef, args: &[SymbolicValue]) -> Result<Evaluation> {
        Ok(match method.body()? {
            Some(body) => self.evaluate_body(method, &body, args),
            None => Evaluation::Skipped {
                reason: SkipReason::NoBody,
                steps: 0,
            },
        })
    }

    /// Evaluates `body` as the body of `method`.
    ///
    /// `args` fill argument slots from index 0; slots beyond `args` stay unknown.
    #[must_use]
    pub fn evaluate_body(
        &self,
        method: &MethodDef,
        body: &MethodBody,
        args: &[SymbolicValue],
    ) -> Evaluation {
        let mut steps = 0;
        match self.run(method, body, args, &mut steps) {
            Ok(value) => Evaluation::Known { value, steps },
            Err(reason) => Evaluation::Skipped { reason, steps },
        }
    }

    fn run(
        &self,
        method: &MethodDef,
        body: &MethodBody,
        args: &[SymbolicValue],
        steps: &mut usize,
    ) -> std::result::Result<i32, SkipReason> {
        if !returns_int32(&method.signature.ret) {
            return Err(SkipReason::NonIntegralReturn);
        }

        let mut emulator = InstructionEmulator::new();
        emulator.initialize(method, body);
        for (index, value) in args.iter().enumerate() {
            let index = u16::try_from(index).map_err(|_| SkipReason::InvalidVariable(u16::MAX))?;
            emulator.set_argument(index, *value)?;
        }

        let mut cursor = 0;
        loop {
            let instruction = body
                .instructions
                .get(cursor)
                .ok_or(SkipReason::FellThrough)?;
            if *steps >= self.max_steps {
                return Err(SkipReason::BudgetExhausted);
            }
            *steps += 1;

            if instruction.opcode == OpCode::Ret {
                return match emulator.state_mut().pop()? {
                    SymbolicValue::Known(value) => Ok(value),
                    SymbolicValue::Unknown => Err(SkipReason::UnknownReturn),
                };
            }

            if instruction.opcode.is_branch() {
                match BranchEmulator.evaluate(emulator.state_mut(), instruction, cursor)? {
                    BranchOutcome::Next(next) => cursor = next,
                    BranchOutcome::Indeterminate => return Err(SkipReason::UnknownBranch),
                }
                continue;
            }

            emulator.step(instruction)?;
            cursor += 1;
        }
    }
}

fn returns_int32(ret: &TypeSig) -> bool {
    matches!(
        ret,
        TypeSig::Boolean
            | TypeSig::Char
            | TypeSig::I1
            | TypeSig::U1
            | TypeSig::I2
            | TypeSig::U2
            | TypeSig::I4
            | TypeSig::U4
    )
}
