//! Bytecode model for the norn engine
//!
//! This crate provides the frozen program representation consumed by the
//! interpreter and both JIT tiers.
//!
//! # Features
//!
//! - Stack-machine opcode set with fused macro-opcodes
//! - Blocks carrying JIT tier, native entry and hotness counters
//! - One-time freezing: label resolution and memory-slot computation
//! - Text assembler and human-readable disassembly
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ProgramBuilder};
//!
//! let mut builder = ProgramBuilder::new();
//! let main = builder.add_block("main").unwrap();
//! builder.emit(main, Opcode::LitInt(42));
//! builder.emit(main, Opcode::StoreInt(0));
//! builder.emit(main, Opcode::Rtrn);
//!
//! let program = builder.finish().unwrap();
//! assert_eq!(program.block(main).memory_slots(), 1);
//! println!("{}", program);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod block;
pub mod instruction;
pub mod opcode;
pub mod program;

// Re-export main types at crate root
pub use assembler::assemble;
pub use block::{Block, JitTier, NativeCode};
pub use instruction::Instruction;
pub use opcode::{BlockId, Opcode};
pub use program::{Program, ProgramBuilder, MAIN_BLOCK};
