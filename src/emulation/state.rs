//! Abstract machine state.

use crate::emulation::{outcome::SkipReason, value::SymbolicValue};

/// Argument slots, local slots and evaluation stack of one analyzed invocation.
///
/// A state is created fresh for every call site and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineState {
    arguments: Vec<SymbolicValue>,
    locals: Vec<SymbolicValue>,
    stack: Vec<SymbolicValue>,
}

impl MachineState {
    /// Creates a state with unknown arguments and zeroed locals.
    #[must_use]
    pub fn new(argument_count: usize, local_count: usize) -> Self {
        Self {
            arguments: vec![SymbolicValue::Unknown; argument_count],
            locals: vec![SymbolicValue::Known(0); local_count],
            stack: Vec::new(),
        }
    }

    /// Reads argument `index`.
    ///
    /// # Errors
    /// Returns [`SkipReason::InvalidVariable`] for an index outside the argument slots.
    pub fn argument(&self, index: u16) -> Result<SymbolicValue, SkipReason> {
        self.arguments
            .get(usize::from(index))
            .copied()
            .ok_or(SkipReason::InvalidVariable(index))
    }

    /// Writes argument `index`.
    ///
    /// # Errors
    /// Returns [`SkipReason::InvalidVariable`] for an index outside the argument slots.
    pub fn set_argument(&mut self, index: u16, value: SymbolicValue) -> Result<(), SkipReason> {
        let slot = self
            .arguments
            .get_mut(usize::from(index))
            .ok_or(SkipReason::InvalidVariable(index))?;
        *slot = value;
        Ok(())
    }

    /// Reads local `index`.
    ///
    /// # Errors
    /// Returns [`SkipReason::InvalidVariable`] for an index outside the local slots.
    pub fn local(&self, index: u16) -> Result<SymbolicValue, SkipReason> {
        self.locals
            .get(usize::from(index))
            .copied()
            .ok_or(SkipReason::InvalidVariable(index))
    }

    /// Writes local `index`.
    ///
    /// # Errors
    /// Returns [`SkipReason::InvalidVariable`] for an index outside the local slots.
    pub fn set_local(&mut self, index: u16, value: SymbolicValue) -> Result<(), SkipReason> {
        let slot = self
            .locals
            .get_mut(usize::from(index))
            .ok_or(SkipReason::InvalidVariable(index))?;
        *slot = value;
        Ok(())
    }

    /// Pushes onto the evaluation stack.
    pub fn push(&mut self, value: SymbolicValue) {
        self.stack.push(value);
    }

    /// Pops from the evaluation stack.
    ///
    /// # Errors
    /// Returns [`SkipReason::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<SymbolicValue, SkipReason> {
        self.stack.pop().ok_or(SkipReason::StackUnderflow)
    }

    /// Pops `count` values and discards them.
    ///
    /// # Errors
    /// Returns [`SkipReason::StackUnderflow`] if fewer than `count` values are on the stack.
    pub fn discard(&mut self, count: usize) -> Result<(), SkipReason> {
        if self.stack.len() < count {
            return Err(SkipReason::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - count);
        Ok(())
    }

    /// Returns the top of the stack without popping it.
    #[must_use]
    pub fn peek(&self) -> Option<SymbolicValue> {
        self.stack.last().copied()
    }

    /// Current stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of argument slots, including `this`.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Number of local slots.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}
