//! Method bodies.

use crate::{
    assembly::instruction::Instruction,
    metadata::{signature::TypeSig, token::Token},
    Result,
};

/// The kind of an exception handling clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionHandlerKind {
    /// Typed `catch` clause
    Catch(Token),
    /// Filtered clause; the filter starts at the given instruction index
    Filter(usize),
    /// `finally` clause
    Finally,
    /// `fault` clause
    Fault,
}

/// An exception handling clause.
///
/// All positions are instruction indices; `*_end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    /// Clause kind
    pub kind: ExceptionHandlerKind,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
}

impl ExceptionHandler {
    /// Every region boundary of this clause, including the filter start.
    #[must_use]
    pub fn boundaries(&self) -> Vec<usize> {
        let mut bounds = vec![
            self.try_start,
            self.try_end,
            self.handler_start,
            self.handler_end,
        ];
        if let ExceptionHandlerKind::Filter(start) = self.kind {
            bounds.push(start);
        }
        bounds
    }

    /// Rewrites every boundary through `map`.
    pub fn map_boundaries(&mut self, mut map: impl FnMut(usize) -> usize) {
        self.try_start = map(self.try_start);
        self.try_end = map(self.try_end);
        self.handler_start = map(self.handler_start);
        self.handler_end = map(self.handler_end);
        if let ExceptionHandlerKind::Filter(start) = &mut self.kind {
            *start = map(*start);
        }
    }
}

/// A decoded method body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Local variable types, by slot
    pub locals: Vec<TypeSig>,
    /// The instruction stream
    pub instructions: Vec<Instruction>,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Creates a body without locals or exception handlers.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
            instructions,
            exception_handlers: Vec::new(),
        }
    }

    /// Sets the local variable types.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<TypeSig>) -> Self {
        self.locals = locals;
        self
    }

    /// Adds an exception handling clause.
    #[must_use]
    pub fn with_exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handlers.push(handler);
        self
    }

    /// Checks that every branch target and region boundary lies within the body.
    ///
    /// Region ends may equal the instruction count; branch targets may not.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] naming the first offending position.
    pub fn validate(&self) -> Result<()> {
        let count = self.instructions.len();

        for (index, instruction) in self.instructions.iter().enumerate() {
            for target in instruction.branch_targets() {
                if target >= count {
                    return Err(malformed_error!(
                        "Instruction {} ({}) branches to {}, body has {} instructions",
                        index,
                        instruction.opcode.mnemonic(),
                        target,
                        count
                    ));
                }
            }
        }

        for handler in &self.exception_handlers {
            if handler.try_start >= handler.try_end || handler.handler_start >= handler.handler_end
            {
                return Err(malformed_error!("Empty exception region {:?}", handler));
            }
            if handler.boundaries().iter().any(|&b| b > count) {
                return Err(malformed_error!(
                    "Exception region {:?} exceeds {} instructions",
                    handler,
                    count
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcode::OpCode;

    #[test]
    fn test_validate_branch_out_of_range() {
        let body = MethodBody::new(vec![
            Instruction::branch(OpCode::BrS, 2),
            Instruction::simple(OpCode::Ret),
        ]);
        assert!(body.validate().is_err());

        let body = MethodBody::new(vec![
            Instruction::branch(OpCode::BrS, 1),
            Instruction::simple(OpCode::Ret),
        ]);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_validate_exception_regions() {
        let instructions = vec![
            Instruction::simple(OpCode::Nop),
            Instruction::branch(OpCode::LeaveS, 3),
            Instruction::simple(OpCode::Endfinally),
            Instruction::simple(OpCode::Ret),
        ];
        let handler = ExceptionHandler {
            kind: ExceptionHandlerKind::Finally,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 3,
        };

        let body = MethodBody::new(instructions.clone()).with_exception_handler(handler);
        assert!(body.validate().is_ok());

        let broken = ExceptionHandler {
            handler_end: 9,
            ..handler
        };
        let body = MethodBody::new(instructions).with_exception_handler(broken);
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_map_boundaries_includes_filter() {
        let mut handler = ExceptionHandler {
            kind: ExceptionHandlerKind::Filter(4),
            try_start: 0,
            try_end: 2,
            handler_start: 6,
            handler_end: 8,
        };
        handler.map_boundaries(|b| b + 1);

        assert_eq!(handler.kind, ExceptionHandlerKind::Filter(5));
        assert_eq!(handler.boundaries(), vec![1, 3, 7, 9, 5]);
    }
}
