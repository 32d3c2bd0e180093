//! Frozen programs and their construction
//!
//! A [`ProgramBuilder`] collects blocks, instructions and pooled strings.
//! [`ProgramBuilder::finish`] freezes the result: labels are resolved to
//! absolute instruction indices and removed, call and string operands are
//! validated, and per-block slot counts are computed. A [`Program`] offers
//! no way to change its structure afterwards; only the JIT state of its
//! blocks and the call-site linking performed on promotion can change.

use std::collections::HashMap;
use std::fmt;

use core_types::{ErrorKind, VmError, VmResult};

use crate::block::Block;
use crate::instruction::Instruction;
use crate::opcode::{BlockId, Opcode};

/// Name of the entry block
pub const MAIN_BLOCK: &str = "main";

/// Builder used by front ends to construct a [`Program`]
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    blocks: Vec<Block>,
    names: HashMap<String, BlockId>,
    strings: Vec<String>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block
    ///
    /// # Arguments
    ///
    /// * `name` - Block name including its signature
    ///
    /// # Returns
    ///
    /// * `Ok(BlockId)` - The id of the new block
    /// * `Err(VmError)` - If a block with this name already exists
    pub fn add_block(&mut self, name: &str) -> VmResult<BlockId> {
        if self.names.contains_key(name) {
            return Err(VmError::new(
                ErrorKind::Assembly,
                format!("duplicate block '{}'", name),
            ));
        }
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block::new(name));
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolve a block id by its signature name
    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.names.get(name).copied()
    }

    /// Intern a string constant and return its pool index
    pub fn add_string(&mut self, text: &str) -> usize {
        if let Some(idx) = self.strings.iter().position(|s| s == text) {
            return idx;
        }
        self.strings.push(text.to_string());
        self.strings.len() - 1
    }

    /// Append an instruction to a block
    ///
    /// # Panics
    ///
    /// Panics if `block` was not returned by this builder.
    pub fn emit(&mut self, block: BlockId, inst: impl Into<Instruction>) {
        self.blocks[block.0].push(inst.into());
    }

    /// Freeze the program
    ///
    /// # Returns
    ///
    /// * `Ok(Program)` - The frozen program
    /// * `Err(VmError)` - On an unknown or duplicate label, a jump past the
    ///   end of its block, an unknown callee or an unknown string index
    pub fn finish(mut self) -> VmResult<Program> {
        let block_count = self.blocks.len();
        let string_count = self.strings.len();
        let mut total_memory_slots = 0;

        for block in &mut self.blocks {
            resolve_jumps(block)?;
            for inst in block.instructions() {
                validate_operands(block.name(), inst, block_count, string_count)?;
            }
            let slots = block
                .instructions()
                .iter()
                .filter_map(|inst| inst.opcode.stored_slot())
                .max()
                .map_or(0, |max| max + 1);
            block.set_memory_slots(slots);
            total_memory_slots += slots;
        }

        Ok(Program {
            blocks: self.blocks,
            names: self.names,
            strings: self.strings,
            total_memory_slots,
        })
    }
}

/// Map label ids to instruction indices, drop the labels and rewrite jumps.
fn resolve_jumps(block: &mut Block) -> VmResult<()> {
    let name = block.name().to_string();
    let mut labels: HashMap<usize, usize> = HashMap::new();
    let mut index = 0;
    for inst in block.instructions() {
        if let Opcode::Lbl(label) = inst.opcode {
            if labels.insert(label, index).is_some() {
                return Err(VmError::new(
                    ErrorKind::Assembly,
                    format!("label {} defined twice in '{}'", label, name),
                ));
            }
        } else {
            index += 1;
        }
    }

    let instructions = block.instructions_mut();
    instructions.retain(|inst| !matches!(inst.opcode, Opcode::Lbl(_)));
    let len = instructions.len();
    for inst in instructions.iter_mut() {
        if let Some(label) = inst.opcode.jump_target() {
            let target = *labels.get(&label).ok_or_else(|| {
                VmError::new(
                    ErrorKind::Assembly,
                    format!("jump to undefined label {} in '{}'", label, name),
                )
            })?;
            if target >= len {
                return Err(VmError::new(
                    ErrorKind::Assembly,
                    format!("label {} in '{}' does not precede an instruction", label, name),
                ));
            }
            inst.opcode = inst.opcode.with_jump_target(target);
        }
    }
    Ok(())
}

fn validate_operands(
    block: &str,
    inst: &Instruction,
    block_count: usize,
    string_count: usize,
) -> VmResult<()> {
    if let Some(callee) = inst.opcode.callee() {
        if callee.0 >= block_count {
            return Err(VmError::new(
                ErrorKind::Assembly,
                format!("'{}' calls unknown block {}", block, callee),
            ));
        }
    }
    if let Opcode::CpyAryChar(idx) = inst.opcode {
        if idx >= string_count {
            return Err(VmError::new(
                ErrorKind::Assembly,
                format!("'{}' copies unknown string {}", block, idx),
            ));
        }
    }
    Ok(())
}

/// A frozen program
#[derive(Debug)]
pub struct Program {
    blocks: Vec<Block>,
    names: HashMap<String, BlockId>,
    strings: Vec<String>,
    total_memory_slots: usize,
}

impl Program {
    /// Block by id
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this program.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// Mutable block by id, for JIT state transitions
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this program.
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    /// Block by id, if it exists
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    /// Resolve a block id by its signature name
    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.names.get(name).copied()
    }

    /// The entry block
    pub fn main(&self) -> Option<BlockId> {
        self.block_id(MAIN_BLOCK)
    }

    /// All blocks with their ids, in registration order
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i), b))
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the program has no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Pooled string by index
    pub fn string(&self, idx: usize) -> Option<&str> {
        self.strings.get(idx).map(String::as_str)
    }

    /// The whole string pool
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Sum of `memory_slots` over all blocks
    pub fn total_memory_slots(&self) -> usize {
        self.total_memory_slots
    }

    /// Rewrite every call to `target` across the program into a native call
    ///
    /// # Returns
    ///
    /// The number of call sites rewritten.
    pub fn link_native_calls(&mut self, target: BlockId) -> usize {
        self.blocks
            .iter_mut()
            .map(|block| block.link_native_calls(target))
            .sum()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, text) in self.strings.iter().enumerate() {
            writeln!(f, "string {}: {:?}", idx, text)?;
        }
        for (_, block) in self.blocks() {
            writeln!(
                f,
                "block {} (slots: {}, tier: {})",
                block.name(),
                block.memory_slots(),
                block.tier()
            )?;
            for (ip, inst) in block.instructions().iter().enumerate() {
                match inst.opcode.callee().and_then(|id| self.get(id)) {
                    Some(callee) => {
                        writeln!(f, "  {:4}: {} {}", ip, inst.opcode.mnemonic(), callee.name())?
                    }
                    None => writeln!(f, "  {:4}: {}", ip, inst)?,
                }
            }
        }
        Ok(())
    }
}
