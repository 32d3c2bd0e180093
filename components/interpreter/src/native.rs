//! Runtime helpers callable from compiled code
//!
//! Compiled code cannot re-enter the dispatch loop, but it does need the
//! runtime services: printing, allocation and checked heap access. Each
//! service is exported as an `extern "C"` function taking the
//! [`NativeContext`] first. Errors cannot unwind through generated frames,
//! so helpers report them and terminate the process.

use core_types::{fatal, NativeContext, VmError, VmResult};
use memory_manager::{FieldWidth, RootSet};

use crate::runtime::Runtime;

/// Machine type of a helper parameter or result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    /// 64-bit integer or pointer
    I64,
    /// 64-bit float
    F64,
}

/// Reason code passed to [`RuntimeHelper::GuardFailed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum GuardFailure {
    /// The callee window does not fit the memory array
    Window = 0,
    /// A push found the operand stack full
    Stack = 1,
    /// Native call nesting exceeded
    Depth = 2,
    /// A pop found the operand stack empty
    Underflow = 3,
}

impl GuardFailure {
    /// Decode a reason code passed by generated code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Window),
            1 => Some(Self::Stack),
            2 => Some(Self::Depth),
            3 => Some(Self::Underflow),
            _ => None,
        }
    }

    /// Error reported for this failure, given the context native code
    /// published before calling the helper
    pub fn error(self, ctx: &NativeContext) -> VmError {
        let message = match self {
            Self::Window => format!(
                "memory window at {} exceeds {} words in native code",
                ctx.mp, ctx.memory_len
            ),
            Self::Stack => format!(
                "operand stack overflow in native code at depth {}",
                ctx.sp
            ),
            Self::Depth => format!("native call depth exceeds {}", ctx.max_depth),
            Self::Underflow => "operand stack underflow in native code".to_string(),
        };
        VmError::bounds(message)
    }
}

/// Services exported to generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeHelper {
    /// `(ctx, value)`
    PrintInt,
    /// `(ctx, bits)`
    PrintFloat,
    /// `(ctx, value)`
    PrintChar,
    /// `(ctx, array)`
    PrintCharArray,
    /// `(ctx, len, frame_slots) -> array`
    NewArray,
    /// `(ctx, size, frame_slots) -> handle`
    Malloc,
    /// `(ctx, array, string)`
    CopyString,
    /// `(ctx, array, index) -> value`
    ArrayLoad,
    /// `(ctx, array, index, value)`
    ArrayStore,
    /// `(ctx, handle, offset, width) -> value`
    StructLoad,
    /// `(ctx, handle, offset, width, value)`
    StructStore,
    /// `(left, right) -> fmod(left, right)`
    Fmod,
    /// `(ctx, reason)`, never returns
    GuardFailed,
}

impl RuntimeHelper {
    /// Every helper, for symbol registration
    pub const ALL: [RuntimeHelper; 13] = [
        RuntimeHelper::PrintInt,
        RuntimeHelper::PrintFloat,
        RuntimeHelper::PrintChar,
        RuntimeHelper::PrintCharArray,
        RuntimeHelper::NewArray,
        RuntimeHelper::Malloc,
        RuntimeHelper::CopyString,
        RuntimeHelper::ArrayLoad,
        RuntimeHelper::ArrayStore,
        RuntimeHelper::StructLoad,
        RuntimeHelper::StructStore,
        RuntimeHelper::Fmod,
        RuntimeHelper::GuardFailed,
    ];

    /// Linker symbol
    pub fn symbol(self) -> &'static str {
        match self {
            RuntimeHelper::PrintInt => "norn_print_int",
            RuntimeHelper::PrintFloat => "norn_print_float",
            RuntimeHelper::PrintChar => "norn_print_char",
            RuntimeHelper::PrintCharArray => "norn_print_char_array",
            RuntimeHelper::NewArray => "norn_new_array",
            RuntimeHelper::Malloc => "norn_malloc",
            RuntimeHelper::CopyString => "norn_copy_string",
            RuntimeHelper::ArrayLoad => "norn_array_load",
            RuntimeHelper::ArrayStore => "norn_array_store",
            RuntimeHelper::StructLoad => "norn_struct_load",
            RuntimeHelper::StructStore => "norn_struct_store",
            RuntimeHelper::Fmod => "norn_fmod",
            RuntimeHelper::GuardFailed => "norn_guard_failed",
        }
    }

    /// Address of the helper
    pub fn address(self) -> *const u8 {
        match self {
            RuntimeHelper::PrintInt => norn_print_int as *const u8,
            RuntimeHelper::PrintFloat => norn_print_float as *const u8,
            RuntimeHelper::PrintChar => norn_print_char as *const u8,
            RuntimeHelper::PrintCharArray => norn_print_char_array as *const u8,
            RuntimeHelper::NewArray => norn_new_array as *const u8,
            RuntimeHelper::Malloc => norn_malloc as *const u8,
            RuntimeHelper::CopyString => norn_copy_string as *const u8,
            RuntimeHelper::ArrayLoad => norn_array_load as *const u8,
            RuntimeHelper::ArrayStore => norn_array_store as *const u8,
            RuntimeHelper::StructLoad => norn_struct_load as *const u8,
            RuntimeHelper::StructStore => norn_struct_store as *const u8,
            RuntimeHelper::Fmod => norn_fmod as *const u8,
            RuntimeHelper::GuardFailed => norn_guard_failed as *const u8,
        }
    }

    /// Parameter types; the context pointer counts as `I64`
    pub fn params(self) -> &'static [AbiType] {
        use AbiType::*;
        match self {
            RuntimeHelper::PrintInt
            | RuntimeHelper::PrintFloat
            | RuntimeHelper::PrintChar
            | RuntimeHelper::PrintCharArray
            | RuntimeHelper::GuardFailed => &[I64, I64],
            RuntimeHelper::NewArray
            | RuntimeHelper::Malloc
            | RuntimeHelper::CopyString
            | RuntimeHelper::ArrayLoad => &[I64, I64, I64],
            RuntimeHelper::ArrayStore | RuntimeHelper::StructLoad => &[I64, I64, I64, I64],
            RuntimeHelper::StructStore => &[I64, I64, I64, I64, I64],
            RuntimeHelper::Fmod => &[F64, F64],
        }
    }

    /// Result type, if any
    pub fn returns(self) -> Option<AbiType> {
        match self {
            RuntimeHelper::NewArray
            | RuntimeHelper::Malloc
            | RuntimeHelper::ArrayLoad
            | RuntimeHelper::StructLoad => Some(AbiType::I64),
            RuntimeHelper::Fmod => Some(AbiType::F64),
            _ => None,
        }
    }
}

/// Encode a field width for [`RuntimeHelper::StructLoad`] and
/// [`RuntimeHelper::StructStore`]
pub fn width_code(width: FieldWidth) -> i64 {
    match width {
        FieldWidth::Byte => 1,
        FieldWidth::Word => 8,
    }
}

fn decode_width(code: i64) -> FieldWidth {
    if code == 1 {
        FieldWidth::Byte
    } else {
        FieldWidth::Word
    }
}

/// Recover the runtime behind a context.
///
/// # Safety
///
/// `ctx` must be a live context built by the machine, whose `runtime`
/// field points to its [`Runtime`].
unsafe fn runtime<'a>(ctx: *mut NativeContext) -> &'a mut Runtime {
    &mut *((*ctx).runtime as *mut Runtime)
}

/// Roots visible to an allocation made by a frame with `frame_slots`
/// locals.
///
/// # Safety
///
/// `ctx` must describe live stack and memory buffers.
unsafe fn roots<'a>(ctx: *mut NativeContext, frame_slots: i64) -> RootSet<'a> {
    let ctx = &*ctx;
    let sp = ctx.sp.clamp(0, ctx.stack_len) as usize;
    let end = (ctx.mp + frame_slots).clamp(0, ctx.memory_len) as usize;
    RootSet {
        stack: std::slice::from_raw_parts(ctx.stack, sp),
        memory: std::slice::from_raw_parts(ctx.memory, end),
    }
}

fn or_fatal<T>(runtime: &mut Runtime, result: VmResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            let _ = runtime.flush();
            fatal(&error)
        }
    }
}

unsafe extern "C" fn norn_print_int(ctx: *mut NativeContext, value: i64) {
    let rt = runtime(ctx);
    let result = rt.print_int(value);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_print_float(ctx: *mut NativeContext, bits: i64) {
    let rt = runtime(ctx);
    let result = rt.print_float(bits);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_print_char(ctx: *mut NativeContext, value: i64) {
    let rt = runtime(ctx);
    let result = rt.print_char(value);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_print_char_array(ctx: *mut NativeContext, array: i64) {
    let rt = runtime(ctx);
    let result = rt.print_char_array(array);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_new_array(ctx: *mut NativeContext, len: i64, frame_slots: i64) -> i64 {
    let rt = runtime(ctx);
    let roots = roots(ctx, frame_slots);
    let result = if len < 0 {
        Err(VmError::memory(format!("negative array length {}", len)))
    } else {
        rt.new_array(len as usize, &roots)
    };
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_malloc(ctx: *mut NativeContext, size: i64, frame_slots: i64) -> i64 {
    let rt = runtime(ctx);
    let roots = roots(ctx, frame_slots);
    let result = rt.malloc(size, &roots);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_copy_string(ctx: *mut NativeContext, array: i64, string: i64) {
    let rt = runtime(ctx);
    let result = rt.copy_string(array, string as usize);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_array_load(ctx: *mut NativeContext, array: i64, index: i64) -> i64 {
    let rt = runtime(ctx);
    let result = rt.array_load(array, index);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_array_store(
    ctx: *mut NativeContext,
    array: i64,
    index: i64,
    value: i64,
) {
    let rt = runtime(ctx);
    let result = rt.array_store(array, index, value);
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_struct_load(
    ctx: *mut NativeContext,
    handle: i64,
    offset: i64,
    width: i64,
) -> i64 {
    let rt = runtime(ctx);
    let result = rt.struct_load(handle, offset as usize, decode_width(width));
    or_fatal(rt, result)
}

unsafe extern "C" fn norn_struct_store(
    ctx: *mut NativeContext,
    handle: i64,
    offset: i64,
    width: i64,
    value: i64,
) {
    let rt = runtime(ctx);
    let result = rt.struct_store(handle, offset as usize, decode_width(width), value);
    or_fatal(rt, result)
}

extern "C" fn norn_fmod(left: f64, right: f64) -> f64 {
    left % right
}

unsafe extern "C" fn norn_guard_failed(ctx: *mut NativeContext, reason: i64) {
    let rt = runtime(ctx);
    let error = match GuardFailure::from_code(reason) {
        Some(failure) => failure.error(&*ctx),
        None => VmError::runtime(format!("unknown guard failure {}", reason)),
    };
    or_fatal(rt, Err::<(), _>(error))
}
