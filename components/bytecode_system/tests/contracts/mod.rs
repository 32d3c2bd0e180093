//! Contract tests for the construction API exposed to front ends

use bytecode_system::{BlockId, Instruction, JitTier, Opcode, Program, ProgramBuilder};

/// Contract: add_block(name) -> Result<BlockId>
#[test]
fn contract_add_block_returns_sequential_ids() {
    let mut builder = ProgramBuilder::new();
    assert_eq!(builder.add_block("main").unwrap(), BlockId(0));
    assert_eq!(builder.add_block("f()").unwrap(), BlockId(1));
}

/// Contract: emit accepts opcodes and instructions
#[test]
fn contract_emit_accepts_instruction() {
    let mut builder = ProgramBuilder::new();
    let main = builder.add_block("main").unwrap();
    builder.emit(main, Opcode::LitInt(1));
    builder.emit(main, Instruction::with_line(Opcode::Rtrn, 2));
    let program: Program = builder.finish().unwrap();
    assert_eq!(program.block(main).len(), 2);
}

/// Contract: a frozen block starts uncompiled and cold
#[test]
fn contract_frozen_block_starts_cold() {
    let mut builder = ProgramBuilder::new();
    let main = builder.add_block("main").unwrap();
    builder.emit(main, Opcode::Rtrn);
    let program = builder.finish().unwrap();
    let block = program.block(main);
    assert_eq!(block.tier(), JitTier::None);
    assert_eq!(block.hotness(), 0);
    assert!(block.native().is_none());
}

/// Contract: main() finds the entry block by name
#[test]
fn contract_main_lookup() {
    let mut builder = ProgramBuilder::new();
    builder.add_block("helper()").unwrap();
    let main = builder.add_block("main").unwrap();
    let program = builder.finish().unwrap();
    assert_eq!(program.main(), Some(main));
}
