//! Bytecode instruction representation
//!
//! Contains the instruction structure and its listing line for diagnostics.

use std::fmt;

use crate::opcode::Opcode;

/// A single bytecode instruction with optional listing line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// The opcode and its operands
    pub opcode: Opcode,
    /// 1-based line of the listing this instruction was assembled from
    pub line: Option<u32>,
}

impl Instruction {
    /// Create a new instruction without line information
    pub fn new(opcode: Opcode) -> Self {
        Self { opcode, line: None }
    }

    /// Create a new instruction with line information
    pub fn with_line(opcode: Opcode, line: u32) -> Self {
        Self {
            opcode,
            line: Some(line),
        }
    }
}

impl From<Opcode> for Instruction {
    fn from(opcode: Opcode) -> Self {
        Instruction::new(opcode)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)
    }
}
