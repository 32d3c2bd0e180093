//! Conservative mark-and-sweep collector over tracked allocations.
//!
//! The collector has no access to the machine's registers. Every allocation
//! site passes the live region of the operand stack and of the memory
//! array as a [`RootSet`]; any word in those regions that equals a tracked
//! handle keeps that allocation alive. Marked buffers are scanned the same
//! way, so handles stored inside structs and arrays are followed.

use std::collections::HashMap;

use serde::Serialize;

use core_types::{VmError, VmResult};

use crate::tracked::{Allocation, WORD};

/// Default number of tracked cells that triggers a collection.
pub const GC_THRESHOLD: usize = 100;

/// Live regions published by the caller before allocating.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootSet<'a> {
    /// Occupied part of the operand stack
    pub stack: &'a [i64],
    /// Memory array up to the end of the active window
    pub memory: &'a [i64],
}

/// Collector statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    /// Number of tracked allocations made
    pub allocations: u64,
    /// Number of completed collections
    pub collections: u64,
    /// Cells that survived the most recent collection
    pub last_survivors: usize,
    /// Cells freed over all collections
    pub freed: u64,
    /// Cells currently tracked
    pub live: usize,
}

/// Width of a struct field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    /// One byte, zero-extended on load
    Byte,
    /// One 64-bit word
    Word,
}

impl FieldWidth {
    fn bytes(self) -> usize {
        match self {
            FieldWidth::Byte => 1,
            FieldWidth::Word => WORD,
        }
    }
}

/// The tracked heap.
#[derive(Debug)]
pub struct Memory {
    cells: HashMap<usize, Allocation>,
    threshold: usize,
    next_collection: usize,
    stats: GcStats,
}

impl Memory {
    /// Create a heap collecting once `threshold` cells are tracked.
    pub fn new(threshold: usize) -> Self {
        Self {
            cells: HashMap::new(),
            threshold,
            next_collection: threshold,
            stats: GcStats::default(),
        }
    }

    /// Allocate a zeroed buffer of `size` bytes.
    ///
    /// Collects first when the tracked cell count has reached the current
    /// trigger. After a collection the trigger is rearmed at
    /// `max(threshold, 2 * survivors)`.
    ///
    /// # Arguments
    ///
    /// * `size` - Buffer size in bytes
    /// * `roots` - Live stack and memory regions at this allocation site
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - The handle of the new allocation
    /// * `Err(VmError)` - If the address is already tracked or memory is exhausted
    pub fn allocate(&mut self, size: usize, roots: &RootSet<'_>) -> VmResult<usize> {
        if self.cells.len() >= self.next_collection {
            let survivors = self.collect(roots);
            self.next_collection = self.threshold.max(survivors * 2);
        }

        let allocation = Allocation::new(size)?;
        let handle = allocation.handle();
        if self.cells.contains_key(&handle) {
            return Err(VmError::memory(format!(
                "address {:#x} is already tracked",
                handle
            )));
        }
        self.cells.insert(handle, allocation);
        self.stats.allocations += 1;
        self.stats.live = self.cells.len();
        Ok(handle)
    }

    /// Allocate a length-prefixed array of `len` words.
    ///
    /// Word 0 holds `len + 1`; element `i` lives in word `i + 1`.
    pub fn allocate_array(&mut self, len: usize, roots: &RootSet<'_>) -> VmResult<usize> {
        let words = len
            .checked_add(1)
            .ok_or_else(|| VmError::memory("array length overflow"))?;
        let bytes = words
            .checked_mul(WORD)
            .ok_or_else(|| VmError::memory("array length overflow"))?;
        let handle = self.allocate(bytes, roots)?;
        self.allocation_mut(handle)?.write(0, WORD, words as i64)?;
        Ok(handle)
    }

    /// Run a full mark and sweep.
    ///
    /// # Returns
    ///
    /// The number of surviving cells.
    pub fn collect(&mut self, roots: &RootSet<'_>) -> usize {
        self.mark(roots);
        let freed = self.sweep();
        let survivors = self.cells.len();
        self.stats.collections += 1;
        self.stats.freed += freed as u64;
        self.stats.last_survivors = survivors;
        self.stats.live = survivors;
        log::debug!("gc: freed {} cells, {} survive", freed, survivors);
        survivors
    }

    fn mark(&mut self, roots: &RootSet<'_>) {
        let mut pending: Vec<usize> = Vec::new();
        for &word in roots.stack.iter().rev().chain(roots.memory.iter().rev()) {
            self.mark_word(word, &mut pending);
        }
        while let Some(handle) = pending.pop() {
            let words: Vec<i64> = match self.cells.get(&handle) {
                Some(allocation) => allocation.words().to_vec(),
                None => continue,
            };
            for word in words {
                self.mark_word(word, &mut pending);
            }
        }
    }

    fn mark_word(&mut self, word: i64, pending: &mut Vec<usize>) {
        if let Some(allocation) = self.cells.get_mut(&(word as usize)) {
            if !allocation.cell().is_marked() {
                allocation.cell_mut().set_marked(true);
                pending.push(word as usize);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let before = self.cells.len();
        self.cells.retain(|_, allocation| allocation.cell().is_marked());
        for allocation in self.cells.values_mut() {
            allocation.cell_mut().set_marked(false);
        }
        before - self.cells.len()
    }

    /// Whether `handle` names a live allocation.
    pub fn contains(&self, handle: usize) -> bool {
        self.cells.contains_key(&handle)
    }

    /// Size in bytes of the allocation behind `handle`.
    pub fn size_of(&self, handle: usize) -> Option<usize> {
        self.cells.get(&handle).map(Allocation::size)
    }

    /// Number of tracked cells.
    pub fn live_count(&self) -> usize {
        self.cells.len()
    }

    /// Collector statistics.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Read a struct field.
    pub fn read_field(&self, handle: usize, offset: usize, width: FieldWidth) -> VmResult<i64> {
        self.allocation(handle)?.read(offset, width.bytes())
    }

    /// Write a struct field.
    pub fn write_field(
        &mut self,
        handle: usize,
        offset: usize,
        width: FieldWidth,
        value: i64,
    ) -> VmResult<()> {
        self.allocation_mut(handle)?.write(offset, width.bytes(), value)
    }

    /// Number of elements of the array behind `handle`.
    pub fn array_len(&self, handle: usize) -> VmResult<usize> {
        let prefix = self.allocation(handle)?.read(0, WORD)?;
        Ok(prefix.saturating_sub(1).max(0) as usize)
    }

    /// Element `index` of an array.
    pub fn array_get(&self, handle: usize, index: i64) -> VmResult<i64> {
        let offset = self.element_offset(handle, index)?;
        self.allocation(handle)?.read(offset, WORD)
    }

    /// Store element `index` of an array.
    pub fn array_set(&mut self, handle: usize, index: i64, value: i64) -> VmResult<()> {
        let offset = self.element_offset(handle, index)?;
        self.allocation_mut(handle)?.write(offset, WORD, value)
    }

    fn element_offset(&self, handle: usize, index: i64) -> VmResult<usize> {
        let len = self.array_len(handle)?;
        if index < 0 || index as usize >= len {
            return Err(VmError::bounds(format!(
                "array index {} out of bounds for length {}",
                index, len
            )));
        }
        Ok((index as usize + 1) * WORD)
    }

    fn allocation(&self, handle: usize) -> VmResult<&Allocation> {
        self.cells.get(&handle).ok_or_else(|| invalid_handle(handle))
    }

    fn allocation_mut(&mut self, handle: usize) -> VmResult<&mut Allocation> {
        self.cells.get_mut(&handle).ok_or_else(|| invalid_handle(handle))
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(GC_THRESHOLD)
    }
}

fn invalid_handle(handle: usize) -> VmError {
    if handle == 0 {
        VmError::memory("null handle dereferenced")
    } else {
        VmError::memory(format!("{:#x} is not a live allocation", handle))
    }
}
