//! Call frames and memory windows

use bytecode_system::BlockId;

/// The slice of the flat memory array owned by one activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryWindow {
    /// First memory word of the window
    pub base: usize,
    /// Number of slots in the window
    pub len: usize,
}

impl MemoryWindow {
    /// Create a window
    pub fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    /// One past the last word of the window
    pub fn end(&self) -> usize {
        self.base + self.len
    }

    /// Window of a callee: it starts right after the caller's slots
    pub fn callee(&self, callee_slots: usize) -> Self {
        Self::new(self.end(), callee_slots)
    }

    /// Whether two windows share any word
    pub fn overlaps(&self, other: &MemoryWindow) -> bool {
        self.len > 0 && other.len > 0 && self.base < other.end() && other.base < self.end()
    }
}

/// Saved caller state, pushed on an interpreted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Instruction to resume at in the caller
    pub return_ip: usize,
    /// Caller block
    pub return_block: BlockId,
    /// Caller memory window
    pub window: MemoryWindow,
}

impl Frame {
    /// Create a new call frame
    pub fn new(return_ip: usize, return_block: BlockId, window: MemoryWindow) -> Self {
        Self {
            return_ip,
            return_block,
            window,
        }
    }
}
