//! CIL instruction model.
//!
//! This module holds everything the inliner needs to read, analyze and rewrite method bodies:
//!
//! - [`OpCode`] with its mnemonic, encoding, operand kind and [`FlowType`]
//! - [`Instruction`] and [`Operand`], where branches hold instruction indices
//! - [`MethodBody`] with exception regions expressed as instruction indices
//! - [`decode_stream`] / [`decode_body`] and [`encode_stream`] / [`encode_body`] for raw IL
//! - [`Blocks`], the basic-block view used while a body is being edited

mod block;
mod body;
mod decoder;
mod encoder;
mod instruction;
mod opcode;

pub use block::{Block, Blocks};
pub use body::{ExceptionHandler, ExceptionHandlerKind, MethodBody};
pub use decoder::{
    decode_body, decode_instruction, decode_stream, RawExceptionClause, RawInstruction,
};
pub use encoder::{encode_body, encode_stream, EncodedBody};
pub use instruction::{Instruction, Operand};
pub use opcode::{FlowType, OpCode, OperandKind};
