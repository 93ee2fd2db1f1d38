//! Branch resolution over partially known values.

use crate::{
    assembly::{Instruction, OpCode, Operand},
    emulation::{outcome::SkipReason, state::MachineState, value::SymbolicValue},
};

/// Where control goes after a branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    /// Continue at this instruction index
    Next(usize),
    /// The decision depends on an unknown value
    Indeterminate,
}

/// Decides branch successors from the values on the evaluation stack.
///
/// Decisions are only made on known operands; any unknown operand makes the branch
/// indeterminate, and the caller abandons the evaluation instead of guessing.
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchEmulator;

impl BranchEmulator {
    /// Pops the branch operands and returns the successor of the branch at `index`.
    ///
    /// # Errors
    /// Returns [`SkipReason::StackUnderflow`] if the operands are missing and
    /// [`SkipReason::Unmodeled`] for `leave`, whose protected-region semantics are not
    /// emulated, and for non-branch instructions.
    pub fn evaluate(
        &self,
        state: &mut MachineState,
        instruction: &Instruction,
        index: usize,
    ) -> Result<BranchOutcome, SkipReason> {
        let fall_through = index + 1;

        if let Operand::Switch(targets) = &instruction.operand {
            let SymbolicValue::Known(selector) = state.pop()? else {
                return Ok(BranchOutcome::Indeterminate);
            };
            let next = usize::try_from(selector)
                .ok()
                .and_then(|i| targets.get(i).copied())
                .unwrap_or(fall_through);
            return Ok(BranchOutcome::Next(next));
        }

        let Operand::Target(target) = instruction.operand else {
            return Err(SkipReason::Unmodeled(instruction.opcode));
        };

        let taken = match instruction.opcode.long_form() {
            OpCode::Br => return Ok(BranchOutcome::Next(target)),
            OpCode::Brtrue | OpCode::Brfalse => {
                let SymbolicValue::Known(value) = state.pop()? else {
                    return Ok(BranchOutcome::Indeterminate);
                };
                (value != 0) == (instruction.opcode.long_form() == OpCode::Brtrue)
            }
            opcode @ (OpCode::Beq
            | OpCode::BneUn
            | OpCode::Bge
            | OpCode::BgeUn
            | OpCode::Bgt
            | OpCode::BgtUn
            | OpCode::Ble
            | OpCode::BleUn
            | OpCode::Blt
            | OpCode::BltUn) => {
                let rhs = state.pop()?;
                let lhs = state.pop()?;
                let (SymbolicValue::Known(a), SymbolicValue::Known(b)) = (lhs, rhs) else {
                    return Ok(BranchOutcome::Indeterminate);
                };
                let (ua, ub) = (a as u32, b as u32);
                match opcode {
                    OpCode::Beq => a == b,
                    OpCode::BneUn => a != b,
                    OpCode::Bge => a >= b,
                    OpCode::BgeUn => ua >= ub,
                    OpCode::Bgt => a > b,
                    OpCode::BgtUn => ua > ub,
                    OpCode::Ble => a <= b,
                    OpCode::BleUn => ua <= ub,
                    OpCode::Blt => a < b,
                    _ => ua < ub,
                }
            }
            _ => return Err(SkipReason::Unmodeled(instruction.opcode)),
        };

        Ok(BranchOutcome::Next(if taken { target } else { fall_through }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SymbolicValue::{Known, Unknown};

    fn decide(stack: &[SymbolicValue], instruction: Instruction) -> Result<BranchOutcome, SkipReason> {
        let mut state = MachineState::new(0, 0);
        for value in stack {
            state.push(*value);
        }
        BranchEmulator.evaluate(&mut state, &instruction, 10)
    }

    #[test]
    fn test_unconditional() {
        assert_eq!(
            decide(&[], Instruction::branch(OpCode::BrS, 3)),
            Ok(BranchOutcome::Next(3))
        );
    }

    #[test]
    fn test_brtrue_brfalse() {
        assert_eq!(
            decide(&[Known(5)], Instruction::branch(OpCode::BrtrueS, 3)),
            Ok(BranchOutcome::Next(3))
        );
        assert_eq!(
            decide(&[Known(0)], Instruction::branch(OpCode::Brtrue, 3)),
            Ok(BranchOutcome::Next(11))
        );
        assert_eq!(
            decide(&[Known(0)], Instruction::branch(OpCode::BrfalseS, 3)),
            Ok(BranchOutcome::Next(3))
        );
        assert_eq!(
            decide(&[Unknown], Instruction::branch(OpCode::Brfalse, 3)),
            Ok(BranchOutcome::Indeterminate)
        );
    }

    #[test]
    fn test_compare_branches() {
        assert_eq!(
            decide(&[Known(2), Known(2)], Instruction::branch(OpCode::BeqS, 0)),
            Ok(BranchOutcome::Next(0))
        );
        assert_eq!(
            decide(&[Known(-1), Known(1)], Instruction::branch(OpCode::Blt, 0)),
            Ok(BranchOutcome::Next(0))
        );
        assert_eq!(
            decide(&[Known(-1), Known(1)], Instruction::branch(OpCode::BltUnS, 0)),
            Ok(BranchOutcome::Next(11))
        );
        assert_eq!(
            decide(&[Known(-1), Known(1)], Instruction::branch(OpCode::BgtUn, 0)),
            Ok(BranchOutcome::Next(0))
        );
        assert_eq!(
            decide(&[Known(1), Unknown], Instruction::branch(OpCode::BneUnS, 0)),
            Ok(BranchOutcome::Indeterminate)
        );
        assert_eq!(
            decide(&[Known(1)], Instruction::branch(OpCode::Bge, 0)),
            Err(SkipReason::StackUnderflow)
        );
    }

    #[test]
    fn test_switch() {
        let switch = || Instruction::new(OpCode::Switch, Operand::Switch(vec![20, 30]));

        assert_eq!(decide(&[Known(1)], switch()), Ok(BranchOutcome::Next(30)));
        assert_eq!(decide(&[Known(2)], switch()), Ok(BranchOutcome::Next(11)));
        assert_eq!(decide(&[Known(-1)], switch()), Ok(BranchOutcome::Next(11)));
        assert_eq!(
            decide(&[Unknown], switch()),
            Ok(BranchOutcome::Indeterminate)
        );
    }

    #[test]
    fn test_leave_is_unmodeled() {
        assert_eq!(
            decide(&[], Instruction::branch(OpCode::LeaveS, 1)),
            Err(SkipReason::Unmodeled(OpCode::LeaveS))
        );
    }
}
