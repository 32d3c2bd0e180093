//! Runtime services shared by the interpreter and compiled code
//!
//! Printing, allocation and heap access go through [`Runtime`] in every
//! tier, so all tiers produce identical output and enforce the same
//! bounds.

use std::io::Write;

use core_types::{format_g, ValueKind, Variant, VmError, VmResult};
use memory_manager::{FieldWidth, Memory, RootSet};

/// Heap, output sink and string pool of a running machine
pub struct Runtime {
    memory: Memory,
    out: Box<dyn Write>,
    strings: Vec<String>,
}

impl Runtime {
    /// Create runtime services
    ///
    /// # Arguments
    ///
    /// * `memory` - The tracked heap
    /// * `out` - Sink for the print builtins
    /// * `strings` - Copy of the program's string pool
    pub fn new(memory: Memory, out: Box<dyn Write>, strings: Vec<String>) -> Self {
        Self {
            memory,
            out,
            strings,
        }
    }

    /// The tracked heap
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Replace the output sink
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Flush the output sink
    pub fn flush(&mut self) -> VmResult<()> {
        self.out.flush()?;
        Ok(())
    }

    /// `PRINT_INT`
    pub fn print_int(&mut self, value: i64) -> VmResult<()> {
        self.print(Variant::from_word(value, ValueKind::Int))
    }

    /// `PRINT_FLOAT`
    pub fn print_float(&mut self, bits: i64) -> VmResult<()> {
        self.print(Variant::from_word(bits, ValueKind::Float))
    }

    /// `PRINT_CHAR`
    pub fn print_char(&mut self, value: i64) -> VmResult<()> {
        self.print(Variant::from_word(value, ValueKind::Char))
    }

    /// Print a value the way the print builtins do: integers in decimal,
    /// floats like `%g`, characters as the raw byte.
    pub fn print(&mut self, value: Variant) -> VmResult<()> {
        match value {
            Variant::Int(i) => write!(self.out, "{}", i)?,
            Variant::Float(f) => self.out.write_all(format_g(f).as_bytes())?,
            Variant::Char(c) => self.out.write_all(&[c])?,
            Variant::Ptr(p) => write!(self.out, "{:#x}", p)?,
        }
        Ok(())
    }

    /// `PRINT_ARY_CHAR`: every element of the array as a byte
    pub fn print_char_array(&mut self, handle: i64) -> VmResult<()> {
        let handle = handle as usize;
        let len = self.memory.array_len(handle)?;
        let mut bytes = Vec::with_capacity(len);
        for index in 0..len {
            bytes.push(self.memory.array_get(handle, index as i64)? as u8);
        }
        self.out.write_all(&bytes)?;
        Ok(())
    }

    /// `NEW_ARY`
    pub fn new_array(&mut self, len: usize, roots: &RootSet<'_>) -> VmResult<i64> {
        Ok(self.memory.allocate_array(len, roots)? as i64)
    }

    /// `MALLOC`
    pub fn malloc(&mut self, size: i64, roots: &RootSet<'_>) -> VmResult<i64> {
        if size < 0 {
            return Err(VmError::memory(format!("negative allocation size {}", size)));
        }
        Ok(self.memory.allocate(size as usize, roots)? as i64)
    }

    /// `CPY_ARY_CHAR`: copy pooled string `index` into the array
    pub fn copy_string(&mut self, handle: i64, index: usize) -> VmResult<()> {
        let text = self
            .strings
            .get(index)
            .ok_or_else(|| VmError::runtime(format!("unknown string {}", index)))?;
        let handle = handle as usize;
        let len = self.memory.array_len(handle)?;
        if text.len() > len {
            return Err(VmError::bounds(format!(
                "string of {} bytes does not fit an array of {}",
                text.len(),
                len
            )));
        }
        for (i, byte) in text.bytes().enumerate() {
            self.memory.array_set(handle, i as i64, byte as i64)?;
        }
        Ok(())
    }

    /// Element load
    pub fn array_load(&self, handle: i64, index: i64) -> VmResult<i64> {
        self.memory.array_get(handle as usize, index)
    }

    /// Element store
    pub fn array_store(&mut self, handle: i64, index: i64, value: i64) -> VmResult<()> {
        self.memory.array_set(handle as usize, index, value)
    }

    /// Struct field load
    pub fn struct_load(&self, handle: i64, offset: usize, width: FieldWidth) -> VmResult<i64> {
        self.memory.read_field(handle as usize, offset, width)
    }

    /// Struct field store
    pub fn struct_store(
        &mut self,
        handle: i64,
        offset: usize,
        width: FieldWidth,
        value: i64,
    ) -> VmResult<()> {
        self.memory.write_field(handle as usize, offset, width, value)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("memory", &self.memory)
            .field("strings", &self.strings)
            .finish()
    }
}
