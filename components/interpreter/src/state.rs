//! Machine registers: operand stack, flat memory, frames and windows
//!
//! All accesses are bounds-checked. Compiled code reaches the same buffers
//! through a [`NativeContext`] built by [`VmState::native_context`]; its
//! cursor changes are validated by [`VmState::sync_stack`].

use std::ffi::c_void;

use core_types::{NativeContext, ValueKind, Variant, VmError, VmResult, Word};
use memory_manager::RootSet;

use crate::call_frame::{Frame, MemoryWindow};

/// Bounds-checked machine state
#[derive(Debug)]
pub struct VmState {
    stack: Vec<Word>,
    sp: usize,
    memory: Vec<Word>,
    window: MemoryWindow,
    frames: Vec<Frame>,
    frame_capacity: usize,
}

impl VmState {
    /// Create state with `stack_size` operand slots and frames, and a
    /// memory array of `stack_size * total_slots` words.
    pub fn new(stack_size: usize, total_slots: usize) -> Self {
        Self {
            stack: vec![0; stack_size],
            sp: 0,
            memory: vec![0; stack_size * total_slots],
            window: MemoryWindow::default(),
            frames: Vec::with_capacity(stack_size),
            frame_capacity: stack_size,
        }
    }

    /// Clear the stacks and open the entry window at memory word 0
    pub fn reset(&mut self, entry_slots: usize) -> VmResult<()> {
        self.sp = 0;
        self.frames.clear();
        self.window = self.checked_window(MemoryWindow::new(0, entry_slots))?;
        Ok(())
    }

    /// Push a word
    pub fn push(&mut self, value: Word) -> VmResult<()> {
        let slot = self
            .stack
            .get_mut(self.sp)
            .ok_or_else(|| VmError::bounds("operand stack overflow"))?;
        *slot = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop a word
    pub fn pop(&mut self) -> VmResult<Word> {
        if self.sp == 0 {
            return Err(VmError::bounds("operand stack underflow"));
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    /// Push a typed value as its raw word
    pub fn push_value(&mut self, value: Variant) -> VmResult<()> {
        self.push(value.to_word())
    }

    /// Pop a word under the interpretation the popping opcode gives it
    pub fn pop_value(&mut self, kind: ValueKind) -> VmResult<Variant> {
        Ok(Variant::from_word(self.pop()?, kind))
    }

    /// Push a float
    pub fn push_float(&mut self, value: f64) -> VmResult<()> {
        self.push_value(Variant::Float(value))
    }

    /// Pop a float
    pub fn pop_float(&mut self) -> VmResult<f64> {
        let value = self.pop_value(ValueKind::Float)?;
        value
            .as_float()
            .ok_or_else(|| VmError::runtime("expected a float operand"))
    }

    /// Read local `slot` of the active window
    pub fn load(&self, slot: usize) -> VmResult<i64> {
        Ok(self.memory[self.slot_index(slot)?])
    }

    /// Write local `slot` of the active window
    pub fn store(&mut self, slot: usize, value: i64) -> VmResult<()> {
        let idx = self.slot_index(slot)?;
        self.memory[idx] = value;
        Ok(())
    }

    fn slot_index(&self, slot: usize) -> VmResult<usize> {
        if slot >= self.window.len {
            return Err(VmError::bounds(format!(
                "slot {} outside a window of {} slots",
                slot, self.window.len
            )));
        }
        Ok(self.window.base + slot)
    }

    fn checked_window(&self, window: MemoryWindow) -> VmResult<MemoryWindow> {
        if window.end() > self.memory.len() {
            return Err(VmError::bounds(format!(
                "memory window {}..{} exceeds {} words",
                window.base,
                window.end(),
                self.memory.len()
            )));
        }
        Ok(window)
    }

    /// Enter an interpreted call
    ///
    /// Saves `return_ip`/`return_block` with the current window and opens
    /// the callee window right after the current one.
    pub fn enter_call(
        &mut self,
        return_ip: usize,
        return_block: bytecode_system::BlockId,
        callee_slots: usize,
    ) -> VmResult<()> {
        if self.frames.len() >= self.frame_capacity {
            return Err(VmError::bounds(format!(
                "call depth exceeds {} frames",
                self.frame_capacity
            )));
        }
        let window = self.checked_window(self.window.callee(callee_slots))?;
        self.frames
            .push(Frame::new(return_ip, return_block, self.window));
        self.window = window;
        Ok(())
    }

    /// Leave an interpreted call, restoring the caller's window
    ///
    /// Returns `None` when no frame is left.
    pub fn leave_call(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.window = frame.window;
        Some(frame)
    }

    /// Window a natively called block would occupy
    pub fn native_window(&self, callee_slots: usize) -> VmResult<MemoryWindow> {
        self.checked_window(self.window.callee(callee_slots))
    }

    /// Build the context block for a native call whose window starts at `mp`
    ///
    /// The raw pointers stay valid until the buffers are next resized,
    /// which never happens after construction.
    pub fn native_context(&mut self, mp: usize, runtime: *mut c_void) -> NativeContext {
        NativeContext {
            stack: self.stack.as_mut_ptr(),
            sp: self.sp as i64,
            stack_len: self.stack.len() as i64,
            memory: self.memory.as_mut_ptr(),
            mp: mp as i64,
            memory_len: self.memory.len() as i64,
            depth: 0,
            max_depth: self.frame_capacity as i64,
            runtime,
        }
    }

    /// Adopt the stack cursor left behind by native code
    pub fn sync_stack(&mut self, sp: i64) -> VmResult<()> {
        if sp < 0 || sp as usize > self.stack.len() {
            return Err(VmError::bounds(format!(
                "native code left stack cursor at {}",
                sp
            )));
        }
        self.sp = sp as usize;
        Ok(())
    }

    /// Roots for an allocation made by the active frame
    pub fn roots(&self) -> RootSet<'_> {
        RootSet {
            stack: &self.stack[..self.sp],
            memory: &self.memory[..self.window.end()],
        }
    }

    /// Occupied part of the operand stack, bottom first
    pub fn stack(&self) -> &[i64] {
        &self.stack[..self.sp]
    }

    /// The whole flat memory array
    pub fn memory(&self) -> &[i64] {
        &self.memory
    }

    /// Active memory window
    pub fn window(&self) -> MemoryWindow {
        self.window
    }

    /// Active frames, outermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}
