//! Calling convention shared by the interpreter and compiled code.
//!
//! Compiled routines receive a pointer to a [`NativeContext`]. The operand
//! stack and the flat memory array are passed as base pointers plus cursor
//! indices, so compiled code mutates exactly the same state the
//! interpreter sees. Cursor fields are plain `i64` so generated code can
//! load and store them without conversions.

use std::ffi::c_void;
use std::ptr;

/// Cursor block handed to every compiled routine.
///
/// Field order is part of the ABI; code generators address fields with
/// `std::mem::offset_of!`.
#[repr(C)]
#[derive(Debug)]
pub struct NativeContext {
    /// Base of the operand stack
    pub stack: *mut i64,
    /// Index of the next free operand stack slot
    pub sp: i64,
    /// Capacity of the operand stack in words
    pub stack_len: i64,
    /// Base of the flat memory array
    pub memory: *mut i64,
    /// Base index of the active memory window
    pub mp: i64,
    /// Capacity of the memory array in words
    pub memory_len: i64,
    /// Current nesting of native calls
    pub depth: i64,
    /// Maximum nesting of native calls
    pub max_depth: i64,
    /// Opaque pointer to the runtime services of the embedding machine
    pub runtime: *mut c_void,
}

impl Default for NativeContext {
    fn default() -> Self {
        Self {
            stack: ptr::null_mut(),
            sp: 0,
            stack_len: 0,
            memory: ptr::null_mut(),
            mp: 0,
            memory_len: 0,
            depth: 0,
            max_depth: 0,
            runtime: ptr::null_mut(),
        }
    }
}

/// Entry point of a compiled block.
///
/// BASIC routines leave results on the shared operand stack and return 0.
/// OPTIMIZING routines return their result in the return register.
pub type NativeFn = unsafe extern "C" fn(*mut NativeContext) -> i64;
