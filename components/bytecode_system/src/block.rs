//! Blocks: one compiled function variant plus its JIT state
//!
//! The instruction sequence and slot count are fixed when the program is
//! frozen. The JIT state (tier, native entry, hotness counters) changes in
//! place as a side effect of execution.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

use core_types::{NativeFn, VmError, VmResult};

use crate::instruction::Instruction;
use crate::opcode::{BlockId, Opcode};

/// Compilation level of a block
///
/// Tiers are ordered and only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum JitTier {
    /// Interpreted only
    #[default]
    None,
    /// Baseline code sharing the interpreter's stack and memory
    Basic,
    /// Register-allocated code returning its result in a register
    Optimizing,
}

impl fmt::Display for JitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JitTier::None => "none",
            JitTier::Basic => "basic",
            JitTier::Optimizing => "optimizing",
        };
        f.write_str(name)
    }
}

/// Executable code together with whatever keeps it mapped
///
/// Dropping a `NativeCode` releases the code memory, so the entry must not
/// be called afterwards.
pub struct NativeCode {
    entry: NativeFn,
    _owner: Box<dyn Any>,
}

impl NativeCode {
    /// Wrap an entry point and the owner of its code memory
    ///
    /// # Arguments
    ///
    /// * `entry` - Entry point of the generated routine
    /// * `owner` - Value whose drop releases the code memory
    pub fn new(entry: NativeFn, owner: Box<dyn Any>) -> Self {
        Self {
            entry,
            _owner: owner,
        }
    }

    /// Entry point of the routine
    pub fn entry(&self) -> NativeFn {
        self.entry
    }
}

impl fmt::Debug for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCode")
            .field("entry", &(self.entry as *const u8))
            .finish()
    }
}

/// A compiled function variant
///
/// The name carries the argument-type signature used for overload
/// resolution, for example `fact(int)`.
#[derive(Debug)]
pub struct Block {
    name: String,
    instructions: Vec<Instruction>,
    memory_slots: usize,
    tier: JitTier,
    native: Option<NativeFn>,
    /// Baseline entry published at a stable address so compiled callers can
    /// call blocks whose compilation is still in progress.
    baseline_entry: Box<Cell<usize>>,
    code: Vec<NativeCode>,
    hotness: u32,
    backedge_hotness: HashMap<usize, u32>,
}

impl Block {
    /// Create an empty block
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            memory_slots: 0,
            tier: JitTier::None,
            native: None,
            baseline_entry: Box::new(Cell::new(0)),
            code: Vec::new(),
            hotness: 0,
            backedge_hotness: HashMap::new(),
        }
    }

    /// Block name including its signature
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instruction sequence
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instruction at `ip`, if in range
    pub fn instruction(&self, ip: usize) -> Option<&Instruction> {
        self.instructions.get(ip)
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the block has no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Size of the memory window reserved for each activation
    pub fn memory_slots(&self) -> usize {
        self.memory_slots
    }

    /// Current compilation tier
    pub fn tier(&self) -> JitTier {
        self.tier
    }

    /// Native entry for the current tier, if compiled
    pub fn native(&self) -> Option<NativeFn> {
        self.native
    }

    /// Address of the cell holding the baseline entry (0 until compiled)
    pub fn baseline_entry_slot(&self) -> *const usize {
        self.baseline_entry.as_ptr()
    }

    /// Blocks called from this block, in first-occurrence order
    pub fn callees(&self) -> Vec<BlockId> {
        let mut callees = Vec::new();
        for inst in &self.instructions {
            if let Some(id) = inst.opcode.callee() {
                if !callees.contains(&id) {
                    callees.push(id);
                }
            }
        }
        callees
    }

    /// Install compiled code at a higher tier
    ///
    /// # Arguments
    ///
    /// * `tier` - Tier of the code; must exceed the current tier
    /// * `code` - The compiled routine, kept alive for the block's lifetime
    ///
    /// # Returns
    ///
    /// * `Err(VmError)` - If `tier` does not raise the current tier
    pub fn install(&mut self, tier: JitTier, code: NativeCode) -> VmResult<()> {
        if tier <= self.tier {
            return Err(VmError::compile(format!(
                "block '{}' is already at tier {}, refusing to install {}",
                self.name, self.tier, tier
            )));
        }
        let entry = code.entry();
        if tier == JitTier::Basic {
            self.baseline_entry.set(entry as usize);
        }
        self.native = Some(entry);
        self.tier = tier;
        self.code.push(code);
        Ok(())
    }

    /// Current call counter
    pub fn hotness(&self) -> u32 {
        self.hotness
    }

    /// Count one call and return the new counter value
    pub fn record_call(&mut self) -> u32 {
        self.hotness = self.hotness.saturating_add(1);
        self.hotness
    }

    /// Counter of the backward jump at `ip`
    pub fn backedge_hotness(&self, ip: usize) -> u32 {
        self.backedge_hotness.get(&ip).copied().unwrap_or(0)
    }

    /// Count one traversal of the backward jump at `ip`
    pub fn record_backedge(&mut self, ip: usize) -> u32 {
        let counter = self.backedge_hotness.entry(ip).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Rewrite every `CALL target` into `CALL_NATIVE target`
    pub(crate) fn link_native_calls(&mut self, target: BlockId) -> usize {
        let mut rewritten = 0;
        for inst in &mut self.instructions {
            if inst.opcode == Opcode::Call(target) {
                inst.opcode = Opcode::CallNative(target);
                rewritten += 1;
            }
        }
        rewritten
    }

    pub(crate) fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    pub(crate) fn set_memory_slots(&mut self, slots: usize) {
        self.memory_slots = slots;
    }
}
