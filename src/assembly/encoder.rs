//! CIL instruction encoding.
//!
//! The encoder is the inverse of [`decode_stream`](crate::assembly::decode_stream). Short
//! branches are always widened to their long forms so every instruction size is known before
//! any offset is computed. String literals produced by the inliner are turned into `#US`
//! tokens through a caller-supplied callback, since only the driver owns the user-string heap.

use crate::{
    assembly::{
        body::{ExceptionHandlerKind, MethodBody},
        decoder::RawExceptionClause,
        instruction::{Instruction, Operand},
        opcode::{OpCode, OperandKind},
    },
    file::io::write_le,
    metadata::token::Token,
    Result,
};

/// The result of encoding a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// The IL bytes
    pub code: Vec<u8>,
    /// Byte offset of each instruction, plus the total length as last entry
    pub offsets: Vec<usize>,
    /// Exception clauses with byte offsets
    pub clauses: Vec<RawExceptionClause>,
}

fn opcode_for(instruction: &Instruction) -> OpCode {
    instruction.opcode.long_form()
}

fn encoded_size(instruction: &Instruction) -> usize {
    let opcode = opcode_for(instruction);
    let operand = match opcode.operand_kind() {
        OperandKind::None => 0,
        OperandKind::ShortI | OperandKind::ShortVar | OperandKind::ShortBranch => 1,
        OperandKind::Var => 2,
        OperandKind::I
        | OperandKind::ShortR
        | OperandKind::Token
        | OperandKind::String
        | OperandKind::Branch => 4,
        OperandKind::I8 | OperandKind::R => 8,
        OperandKind::Switch => match &instruction.operand {
            Operand::Switch(targets) => 4 + 4 * targets.len(),
            _ => 4,
        },
    };
    opcode.size() + operand
}

/// Encodes an instruction sequence to IL bytes.
///
/// `user_string` is called once per `ldstr` carrying a literal and must return the `#US`
/// token for it.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an operand does not fit its opcode, and whatever
/// `user_string` returns.
pub fn encode_stream<F>(instructions: &[Instruction], mut user_string: F) -> Result<EncodedBody>
where
    F: FnMut(&str) -> Result<Token>,
{
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut offset = 0;
    for instruction in instructions {
        offsets.push(offset);
        offset += encoded_size(instruction);
    }
    offsets.push(offset);

    let target_offset = |target: usize| -> Result<i32> {
        if target >= instructions.len() {
            return Err(malformed_error!("Branch target {} out of range", target));
        }
        i32::try_from(offsets[target])
            .map_err(|_| malformed_error!("Method body exceeds 2GB"))
    };

    let mut code = Vec::with_capacity(offset);
    for (index, instruction) in instructions.iter().enumerate() {
        let opcode = opcode_for(instruction);
        if opcode.is_two_byte() {
            code.push(0xFE);
        }
        code.push((opcode.code() & 0xFF) as u8);

        let mismatch = || {
            malformed_error!(
                "Operand {:?} does not fit {}",
                instruction.operand,
                opcode.mnemonic()
            )
        };
        let next = i32::try_from(offsets[index + 1])
            .map_err(|_| malformed_error!("Method body exceeds 2GB"))?;

        match (opcode.operand_kind(), &instruction.operand) {
            (OperandKind::None, Operand::None) => {}
            (OperandKind::ShortI, Operand::I32(value)) => {
                write_le(&mut code, i8::try_from(*value).map_err(|_| mismatch())?);
            }
            (OperandKind::I, Operand::I32(value)) => write_le(&mut code, *value),
            (OperandKind::I8, Operand::I64(value)) => write_le(&mut code, *value),
            (OperandKind::ShortR, Operand::F32(value)) => write_le(&mut code, *value),
            (OperandKind::R, Operand::F64(value)) => write_le(&mut code, *value),
            (OperandKind::ShortVar, Operand::Var(index)) => {
                write_le(&mut code, u8::try_from(*index).map_err(|_| mismatch())?);
            }
            (OperandKind::Var, Operand::Var(index)) => write_le(&mut code, *index),
            (OperandKind::Token | OperandKind::String, Operand::Token(token)) => {
                write_le(&mut code, token.value());
            }
            (OperandKind::String, Operand::String(value)) => {
                write_le(&mut code, user_string(value)?.value());
            }
            (OperandKind::Branch, Operand::Target(target)) => {
                write_le(&mut code, target_offset(*target)? - next);
            }
            (OperandKind::Switch, Operand::Switch(targets)) => {
                write_le(
                    &mut code,
                    u32::try_from(targets.len()).map_err(|_| mismatch())?,
                );
                for target in targets {
                    write_le(&mut code, target_offset(*target)? - next);
                }
            }
            _ => return Err(mismatch()),
        }
    }

    Ok(EncodedBody {
        code,
        offsets,
        clauses: Vec::new(),
    })
}

/// Encodes a method body, including its exception clauses.
///
/// # Errors
/// See [`encode_stream`].
pub fn encode_body<F>(body: &MethodBody, user_string: F) -> Result<EncodedBody>
where
    F: FnMut(&str) -> Result<Token>,
{
    let mut encoded = encode_stream(&body.instructions, user_string)?;

    let offset = |index: usize| -> Result<usize> {
        encoded
            .offsets
            .get(index)
            .copied()
            .ok_or_else(|| malformed_error!("Exception boundary {} out of range", index))
    };

    let mut clauses = Vec::with_capacity(body.exception_handlers.len());
    for handler in &body.exception_handlers {
        let kind = match handler.kind {
            ExceptionHandlerKind::Filter(start) => ExceptionHandlerKind::Filter(offset(start)?),
            other => other,
        };
        let try_offset = offset(handler.try_start)?;
        let handler_offset = offset(handler.handler_start)?;
        clauses.push(RawExceptionClause {
            kind,
            try_offset,
            try_length: offset(handler.try_end)? - try_offset,
            handler_offset,
            handler_length: offset(handler.handler_end)? - handler_offset,
        });
    }

    encoded.clauses = clauses;
    Ok(encoded)
}
