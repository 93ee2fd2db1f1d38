//! Straight-line instruction semantics.
//!
//! [`InstructionEmulator`] executes every non-branching instruction against a
//! [`MachineState`]. Anything that would need the heap, another method or the resolver
//! either yields [`SymbolicValue::Unknown`] (loads) or aborts the evaluation (calls,
//! address-taking, exceptions).

use crate::{
    assembly::{Instruction, MethodBody, OpCode},
    emulation::{
        outcome::SkipReason,
        state::MachineState,
        value::{BinaryOp, CompareOp, Conversion, SymbolicValue},
    },
    metadata::module::MethodDef,
};

/// Interprets single instructions over a [`MachineState`].
#[derive(Debug, Default)]
pub struct InstructionEmulator {
    state: MachineState,
}

impl InstructionEmulator {
    /// Creates an emulator with an empty state; call [`Self::initialize`] before stepping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the state for `method`: one slot per parameter plus `this`, one per local.
    ///
    /// Arguments start unknown and locals start at zero.
    pub fn initialize(&mut self, method: &MethodDef, body: &MethodBody) {
        self.state = MachineState::new(method.signature.arg_count(), body.locals.len());
    }

    /// Overrides argument `index` with a concrete or symbolic value.
    ///
    /// # Errors
    /// Returns [`SkipReason::InvalidVariable`] if the method has no such argument.
    pub fn set_argument(&mut self, index: u16, value: SymbolicValue) -> Result<(), SkipReason> {
        self.state.set_argument(index, value)
    }

    /// The current machine state.
    #[must_use]
    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Mutable access to the machine state, used by the branch emulator.
    pub fn state_mut(&mut self) -> &mut MachineState {
        &mut self.state
    }

    /// Executes one non-branching instruction.
    ///
    /// # Errors
    /// Returns the [`SkipReason`] that makes the invocation's result undeterminable:
    /// [`SkipReason::Unmodeled`] for calls, branches, `ret` and address-taking opcodes,
    /// [`SkipReason::StackUnderflow`], [`SkipReason::InvalidVariable`] or
    /// [`SkipReason::ArithmeticFault`].
    pub fn step(&mut self, instruction: &Instruction) -> Result<(), SkipReason> {
        if let Some(value) = instruction.ldc_i4_value() {
            self.state.push(SymbolicValue::Known(value));
            return Ok(());
        }
        if let Some(index) = instruction.ldarg_index() {
            let value = self.state.argument(index)?;
            self.state.push(value);
            return Ok(());
        }
        if let Some(index) = instruction.ldloc_index() {
            let value = self.state.local(index)?;
            self.state.push(value);
            return Ok(());
        }
        if let Some(index) = instruction.stloc_index() {
            let value = self.state.pop()?;
            return self.state.set_local(index, value);
        }
        if let Some(index) = instruction.starg_index() {
            let value = self.state.pop()?;
            return self.state.set_argument(index, value);
        }

        let state = &mut self.state;
        match instruction.opcode {
            OpCode::Nop => {}

            // Non-int32 constants and references occupy a slot we cannot track
            OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldnull
            | OpCode::Ldstr
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Ldtoken
            | OpCode::Ldftn => state.push(SymbolicValue::Unknown),

            OpCode::Dup => {
                let value = state.pop()?;
                state.push(value);
                state.push(value);
            }
            OpCode::Pop | OpCode::Stsfld => state.discard(1)?,

            OpCode::Add => self.binary(BinaryOp::Add)?,
            OpCode::Sub => self.binary(BinaryOp::Sub)?,
            OpCode::Mul => self.binary(BinaryOp::Mul)?,
            OpCode::Div => self.binary(BinaryOp::Div)?,
            OpCode::DivUn => self.binary(BinaryOp::DivUn)?,
            OpCode::Rem => self.binary(BinaryOp::Rem)?,
            OpCode::RemUn => self.binary(BinaryOp::RemUn)?,
            OpCode::And => self.binary(BinaryOp::And)?,
            OpCode::Or => self.binary(BinaryOp::Or)?,
            OpCode::Xor => self.binary(BinaryOp::Xor)?,
            OpCode::Shl => self.binary(BinaryOp::Shl)?,
            OpCode::Shr => self.binary(BinaryOp::Shr)?,
            OpCode::ShrUn => self.binary(BinaryOp::ShrUn)?,

            OpCode::Neg => {
                let value = state.pop()?;
                state.push(value.neg());
            }
            OpCode::Not => {
                let value = state.pop()?;
                state.push(value.not());
            }

            OpCode::Ceq => self.compare(CompareOp::Eq)?,
            OpCode::Clt => self.compare(CompareOp::Lt)?,
            OpCode::Cgt => self.compare(CompareOp::Gt)?,
            OpCode::CltUn => self.compare(CompareOp::LtUn)?,
            OpCode::CgtUn => self.compare(CompareOp::GtUn)?,

            OpCode::ConvI1 => self.convert(Conversion::I1)?,
            OpCode::ConvU1 => self.convert(Conversion::U1)?,
            OpCode::ConvI2 => self.convert(Conversion::I2)?,
            OpCode::ConvU2 => self.convert(Conversion::U2)?,
            OpCode::ConvI4 | OpCode::ConvU4 => self.convert(Conversion::I4)?,

            // Widening leaves the int32 domain
            OpCode::ConvI8 | OpCode::ConvU8 | OpCode::ConvR4 | OpCode::ConvR8 => {
                state.pop()?;
                state.push(SymbolicValue::Unknown);
            }

            // One operand in, an untracked value out
            OpCode::LdindI1
            | OpCode::LdindU1
            | OpCode::LdindI2
            | OpCode::LdindU2
            | OpCode::LdindI4
            | OpCode::LdindU4
            | OpCode::LdindI8
            | OpCode::LdindI
            | OpCode::LdindR4
            | OpCode::LdindR8
            | OpCode::LdindRef
            | OpCode::Ldfld
            | OpCode::Ldflda
            | OpCode::Ldlen
            | OpCode::Box
            | OpCode::UnboxAny
            | OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Newarr => {
                state.pop()?;
                state.push(SymbolicValue::Unknown);
            }

            OpCode::LdelemI1
            | OpCode::LdelemU1
            | OpCode::LdelemI2
            | OpCode::LdelemU2
            | OpCode::LdelemI4
            | OpCode::LdelemU4
            | OpCode::LdelemI8
            | OpCode::LdelemRef => {
                state.discard(2)?;
                state.push(SymbolicValue::Unknown);
            }

            OpCode::StindRef
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::Stfld => state.discard(2)?,

            OpCode::StelemI1
            | OpCode::StelemI2
            | OpCode::StelemI4
            | OpCode::StelemI8
            | OpCode::StelemRef => state.discard(3)?,

            other => return Err(SkipReason::Unmodeled(other)),
        }

        Ok(())
    }

    fn binary(&mut self, op: BinaryOp) -> Result<(), SkipReason> {
        let rhs = self.state.pop()?;
        let lhs = self.state.pop()?;
        let result = lhs.binary(op, rhs).ok_or(SkipReason::ArithmeticFault)?;
        self.state.push(result);
        Ok(())
    }

    fn compare(&mut self, op: CompareOp) -> Result<(), SkipReason> {
        let rhs = self.state.pop()?;
        let lhs = self.state.pop()?;
        self.state.push(lhs.compare(op, rhs));
        Ok(())
    }

    fn convert(&mut self, conversion: Conversion) -> Result<(), SkipReason> {
        let value = self.state.pop()?;
        self.state.push(value.convert(conversion));
        Ok(())
    }
}
