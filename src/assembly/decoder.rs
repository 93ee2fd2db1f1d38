//! CIL instruction decoding.
//!
//! Decoding runs in two passes. [`decode_instruction`] reads one opcode and operand and keeps
//! branch targets as absolute byte offsets; [`decode_stream`] then maps every byte offset to
//! the index of the instruction starting there. A target that does not land on an instruction
//! boundary makes the whole stream malformed.
//!
//! # Usage Examples
//!
//! ```rust
//! use dotinline::assembly::{decode_stream, OpCode};
//!
//! // ldarg.0; brtrue.s +1; ldc.i4.0; ldc.i4.1; ret
//! let code = [0x02, 0x2D, 0x01, 0x16, 0x17, 0x2A];
//! let instructions = decode_stream(&code)?;
//!
//! assert_eq!(instructions.len(), 5);
//! assert_eq!(instructions[1].opcode, OpCode::BrtrueS);
//! assert_eq!(instructions[1].branch_targets(), vec![3]);
//! # Ok::<(), dotinline::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        body::{ExceptionHandler, ExceptionHandlerKind, MethodBody},
        instruction::{Instruction, Operand},
        opcode::{OpCode, OperandKind},
    },
    file::parser::Parser,
    metadata::{signature::TypeSig, token::Token},
    Result,
};

/// An instruction as read from the stream, before branch offsets are mapped to indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstruction {
    /// Byte offset of the first opcode byte
    pub offset: usize,
    /// Encoded size in bytes
    pub size: usize,
    /// The decoded instruction; branch operands hold absolute byte offsets
    pub instruction: Instruction,
}

/// An exception clause as stored in the method header, with byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExceptionClause {
    /// Clause kind; a filter carries the byte offset of its filter block
    pub kind: ExceptionHandlerKind,
    /// Byte offset of the protected region
    pub try_offset: usize,
    /// Byte length of the protected region
    pub try_length: usize,
    /// Byte offset of the handler
    pub handler_offset: usize,
    /// Byte length of the handler
    pub handler_length: usize,
}

/// Decodes a single instruction at the parser's position.
///
/// Branch operands are returned as absolute byte offsets.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for a truncated stream and
/// [`crate::Error::Malformed`] for an opcode outside the supported table.
pub fn decode_instruction(parser: &mut Parser) -> Result<RawInstruction> {
    let offset = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let code = match first_byte {
        0xFE => 0xFE00 | u16::from(parser.read_le::<u8>()?),
        _ => u16::from(first_byte),
    };
    let Some(opcode) = OpCode::from_code(code) else {
        return Err(malformed_error!(
            "Invalid opcode: {:X} at offset {}",
            code,
            offset
        ));
    };

    let operand = match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::ShortI => Operand::I32(i32::from(parser.read_le::<i8>()?)),
        OperandKind::I => Operand::I32(parser.read_le::<i32>()?),
        OperandKind::I8 => Operand::I64(parser.read_le::<i64>()?),
        OperandKind::ShortR => Operand::F32(parser.read_le::<f32>()?),
        OperandKind::R => Operand::F64(parser.read_le::<f64>()?),
        OperandKind::ShortVar => Operand::Var(u16::from(parser.read_le::<u8>()?)),
        OperandKind::Var => Operand::Var(parser.read_le::<u16>()?),
        OperandKind::Token | OperandKind::String => {
            Operand::Token(Token::new(parser.read_le::<u32>()?))
        }
        OperandKind::ShortBranch => {
            let delta = i64::from(parser.read_le::<i8>()?);
            Operand::Target(absolute_target(parser.pos(), delta, offset)?)
        }
        OperandKind::Branch => {
            let delta = i64::from(parser.read_le::<i32>()?);
            Operand::Target(absolute_target(parser.pos(), delta, offset)?)
        }
        OperandKind::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count.saturating_mul(4) > parser.len() - parser.pos() {
                return Err(crate::Error::OutOfBounds);
            }

            let mut deltas = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                deltas.push(i64::from(parser.read_le::<i32>()?));
            }

            let next = parser.pos();
            let targets = deltas
                .into_iter()
                .map(|delta| absolute_target(next, delta, offset))
                .collect::<Result<Vec<_>>>()?;
            Operand::Switch(targets)
        }
    };

    Ok(RawInstruction {
        offset,
        size: parser.pos() - offset,
        instruction: Instruction::new(opcode, operand),
    })
}

fn absolute_target(next: usize, delta: i64, offset: usize) -> Result<usize> {
    let target = next as i64 + delta;
    usize::try_from(target).map_err(|_| {
        malformed_error!(
            "Branch at offset {} targets negative offset {}",
            offset,
            target
        )
    })
}

/// Decodes a complete IL stream into instructions with index-based branch targets.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for a truncated stream and
/// [`crate::Error::Malformed`] for unknown opcodes or branches that do not land on an
/// instruction boundary.
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    let (instructions, _) = decode_with_offsets(code)?;
    Ok(instructions)
}

fn decode_with_offsets(code: &[u8]) -> Result<(Vec<Instruction>, HashMap<usize, usize>)> {
    let mut parser = Parser::new(code);
    let mut raw = Vec::new();
    while parser.has_more_data() {
        raw.push(decode_instruction(&mut parser)?);
    }

    let index_of: HashMap<usize, usize> = raw
        .iter()
        .enumerate()
        .map(|(index, instruction)| (instruction.offset, index))
        .collect();

    let mut instructions = Vec::with_capacity(raw.len());
    for entry in raw {
        let mut instruction = entry.instruction;
        let mut invalid = None;
        instruction.map_targets(|target| match index_of.get(&target) {
            Some(&index) => index,
            None => {
                invalid = Some(target);
                target
            }
        });
        if let Some(target) = invalid {
            return Err(malformed_error!(
                "{} at offset {} branches to {}, which is not an instruction boundary",
                instruction.opcode.mnemonic(),
                entry.offset,
                target
            ));
        }
        instructions.push(instruction);
    }

    Ok((instructions, index_of))
}

/// Decodes a method body, converting exception clause byte ranges to instruction indices.
///
/// # Errors
/// Everything [`decode_stream`] reports, plus [`crate::Error::Malformed`] for exception
/// clauses whose boundaries do not fall on instruction boundaries.
pub fn decode_body(
    code: &[u8],
    max_stack: u16,
    locals: Vec<TypeSig>,
    clauses: &[RawExceptionClause],
) -> Result<MethodBody> {
    let (instructions, mut index_of) = decode_with_offsets(code)?;
    index_of.insert(code.len(), instructions.len());

    let boundary = |offset: usize| -> Result<usize> {
        index_of.get(&offset).copied().ok_or_else(|| {
            malformed_error!(
                "Exception clause boundary {} is not an instruction boundary",
                offset
            )
        })
    };

    let mut exception_handlers = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let kind = match clause.kind {
            ExceptionHandlerKind::Filter(offset) => ExceptionHandlerKind::Filter(boundary(offset)?),
            other => other,
        };
        exception_handlers.push(ExceptionHandler {
            kind,
            try_start: boundary(clause.try_offset)?,
            try_end: boundary(clause.try_offset + clause.try_length)?,
            handler_start: boundary(clause.handler_offset)?,
            handler_end: boundary(clause.handler_offset + clause.handler_length)?,
        });
    }

    let body = MethodBody {
        max_stack,
        init_locals: true,
        locals,
        instructions,
        exception_handlers,
    };
    body.validate()?;
    Ok(body)
}
