//! Basic blocks of a method body.
//!
//! [`Blocks`] splits a [`MethodBody`] at every leader (entry, branch targets, the instruction
//! after any control transfer, exception region boundaries). While the body is split, branch
//! operands and exception regions refer to *block* indices, so the instructions inside a block
//! can be replaced freely. [`Blocks::into_body`] flattens the blocks again and maps block
//! indices back to instruction indices.

use std::{collections::BTreeSet, ops::Range};

use crate::{
    assembly::{
        body::{ExceptionHandler, MethodBody},
        instruction::Instruction,
        opcode::FlowType,
    },
    metadata::signature::TypeSig,
    Result,
};

/// A straight-line run of instructions with a single entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// The instructions; branch operands hold block indices
    pub instructions: Vec<Instruction>,
}

impl Block {
    /// Replaces `range` with `replacement` and returns the removed instructions.
    pub fn splice(
        &mut self,
        range: Range<usize>,
        replacement: impl IntoIterator<Item = Instruction>,
    ) -> Vec<Instruction> {
        self.instructions.splice(range, replacement).collect()
    }

    /// Number of instructions in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the block has been emptied by an edit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A method body split into basic blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Blocks {
    blocks: Vec<Block>,
    exception_handlers: Vec<ExceptionHandler>,
    max_stack: u16,
    init_locals: bool,
    locals: Vec<TypeSig>,
}

impl Blocks {
    /// Splits a method body into basic blocks.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a branch target or exception region lies
    /// outside the body.
    pub fn from_body(body: MethodBody) -> Result<Self> {
        body.validate()?;

        let MethodBody {
            max_stack,
            init_locals,
            locals,
            instructions,
            mut exception_handlers,
        } = body;
        let count = instructions.len();

        let mut leaders = BTreeSet::new();
        if count > 0 {
            leaders.insert(0);
        }
        for (index, instruction) in instructions.iter().enumerate() {
            leaders.extend(instruction.branch_targets());
            if !matches!(instruction.flow_type(), FlowType::Sequential | FlowType::Call)
                && index + 1 < count
            {
                leaders.insert(index + 1);
            }
        }
        for handler in &exception_handlers {
            leaders.extend(handler.boundaries().into_iter().filter(|&b| b < count));
        }

        // block_of[i] is the block starting at instruction i, or the one containing it
        let mut block_of = vec![0usize; count + 1];
        let mut blocks: Vec<Block> = Vec::with_capacity(leaders.len());
        for (index, instruction) in instructions.into_iter().enumerate() {
            if leaders.contains(&index) {
                blocks.push(Block::default());
            }
            block_of[index] = blocks.len() - 1;
            if let Some(block) = blocks.last_mut() {
                block.instructions.push(instruction);
            }
        }
        block_of[count] = blocks.len();

        for block in &mut blocks {
            for instruction in &mut block.instructions {
                instruction.map_targets(|target| block_of[target]);
            }
        }
        for handler in &mut exception_handlers {
            handler.map_boundaries(|boundary| block_of[boundary]);
        }

        Ok(Self {
            blocks,
            exception_handlers,
            max_stack,
            init_locals,
            locals,
        })
    }

    /// Flattens the blocks back into a method body.
    #[must_use]
    pub fn into_body(self) -> MethodBody {
        let mut starts = Vec::with_capacity(self.blocks.len() + 1);
        let mut offset = 0;
        for block in &self.blocks {
            starts.push(offset);
            offset += block.len();
        }
        starts.push(offset);

        let mut instructions = Vec::with_capacity(offset);
        for block in self.blocks {
            for mut instruction in block.instructions {
                instruction.map_targets(|target| starts[target]);
                instructions.push(instruction);
            }
        }

        let mut exception_handlers = self.exception_handlers;
        for handler in &mut exception_handlers {
            handler.map_boundaries(|boundary| starts[boundary]);
        }

        MethodBody {
            max_stack: self.max_stack,
            init_locals: self.init_locals,
            locals: self.locals,
            instructions,
            exception_handlers,
        }
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true for an empty body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Mutable access to the block at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    /// Iterates over the blocks in layout order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Exception regions, with boundaries expressed as block indices.
    #[must_use]
    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }
}
