//! Lowering pieces shared by both tiers
//!
//! Context field access, the shared operand stack, entry guards, branch
//! label discovery and the pure value operations (arithmetic, comparison,
//! conversion). Tiers differ in where operands and locals live, not in how
//! an `ADD_INT` is computed.

use std::collections::{BTreeSet, HashMap};
use std::mem::offset_of;

use bytecode_system::{Block, Opcode};
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    types, Block as Label, FuncRef, Function, InstBuilder, MemFlags, Value,
};
use cranelift_frontend::{FunctionBuilder, Variable};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Module};
use core_types::NativeContext;
use interpreter::{GuardFailure, RuntimeHelper};

pub(crate) const CTX_STACK: i32 = offset_of!(NativeContext, stack) as i32;
pub(crate) const CTX_SP: i32 = offset_of!(NativeContext, sp) as i32;
pub(crate) const CTX_STACK_LEN: i32 = offset_of!(NativeContext, stack_len) as i32;
pub(crate) const CTX_MEMORY: i32 = offset_of!(NativeContext, memory) as i32;
pub(crate) const CTX_MP: i32 = offset_of!(NativeContext, mp) as i32;
pub(crate) const CTX_MEMORY_LEN: i32 = offset_of!(NativeContext, memory_len) as i32;
pub(crate) const CTX_DEPTH: i32 = offset_of!(NativeContext, depth) as i32;
pub(crate) const CTX_MAX_DEPTH: i32 = offset_of!(NativeContext, max_depth) as i32;

/// Variable holding the stack cursor
pub(crate) fn sp_var() -> Variable {
    Variable::from_u32(0)
}

fn flags() -> MemFlags {
    MemFlags::trusted()
}

/// Runtime helpers imported into the function being built
pub(crate) struct HelperRefs {
    refs: Vec<FuncRef>,
}

impl HelperRefs {
    pub(crate) fn import(module: &mut JITModule, ids: &[FuncId], func: &mut Function) -> Self {
        let refs = ids
            .iter()
            .map(|id| module.declare_func_in_func(*id, func))
            .collect();
        Self { refs }
    }

    pub(crate) fn get(&self, helper: RuntimeHelper) -> FuncRef {
        self.refs[helper as usize]
    }
}

/// Read an `i64` context field
pub(crate) fn load_field(builder: &mut FunctionBuilder<'_>, ctx: Value, offset: i32) -> Value {
    builder.ins().load(types::I64, flags(), ctx, offset)
}

/// Write an `i64` context field
pub(crate) fn store_field(builder: &mut FunctionBuilder<'_>, ctx: Value, offset: i32, value: Value) {
    builder.ins().store(flags(), value, ctx, offset);
}

/// Call a helper, returning its result if it has one
pub(crate) fn call_helper(
    builder: &mut FunctionBuilder<'_>,
    helpers: &HelperRefs,
    helper: RuntimeHelper,
    args: &[Value],
) -> Option<Value> {
    let call = builder.ins().call(helpers.get(helper), args);
    builder.inst_results(call).first().copied()
}

/// The operand stack shared with the interpreter
///
/// The cursor lives in [`sp_var`] and is written back to the context only
/// where someone else may look at it. Every push and pop is checked
/// against the buffer, so a block that leaks or drains operands in a loop
/// fails the same way it does when interpreted.
#[derive(Clone, Copy)]
pub(crate) struct SharedStack {
    ctx: Value,
    base: Value,
    len: Value,
}

impl SharedStack {
    /// Load the stack base, length and cursor from the context
    pub(crate) fn enter(builder: &mut FunctionBuilder<'_>, ctx: Value) -> Self {
        let base = load_field(builder, ctx, CTX_STACK);
        let len = load_field(builder, ctx, CTX_STACK_LEN);
        builder.declare_var(sp_var(), types::I64);
        let sp = load_field(builder, ctx, CTX_SP);
        builder.def_var(sp_var(), sp);
        Self { ctx, base, len }
    }

    fn slot_addr(&self, builder: &mut FunctionBuilder<'_>, index: Value) -> Value {
        let offset = builder.ins().ishl_imm(index, 3);
        builder.ins().iadd(self.base, offset)
    }

    pub(crate) fn push(&self, builder: &mut FunctionBuilder<'_>, helpers: &HelperRefs, value: Value) {
        let sp = builder.use_var(sp_var());
        let ok = builder.ins().icmp(IntCC::SignedLessThan, sp, self.len);
        guard(builder, helpers, self.ctx, ok, GuardFailure::Stack);
        let addr = self.slot_addr(builder, sp);
        builder.ins().store(flags(), value, addr, 0);
        let sp = builder.ins().iadd_imm(sp, 1);
        builder.def_var(sp_var(), sp);
    }

    pub(crate) fn pop(&self, builder: &mut FunctionBuilder<'_>, helpers: &HelperRefs) -> Value {
        let sp = builder.use_var(sp_var());
        let ok = builder.ins().icmp_imm(IntCC::SignedGreaterThan, sp, 0);
        guard(builder, helpers, self.ctx, ok, GuardFailure::Underflow);
        let sp = builder.ins().iadd_imm(sp, -1);
        builder.def_var(sp_var(), sp);
        let addr = self.slot_addr(builder, sp);
        builder.ins().load(types::I64, flags(), addr, 0)
    }

    /// Publish the cursor to the context
    pub(crate) fn flush(&self, builder: &mut FunctionBuilder<'_>) {
        let sp = builder.use_var(sp_var());
        store_field(builder, self.ctx, CTX_SP, sp);
    }

    /// Adopt the cursor a callee left in the context
    pub(crate) fn reload(&self, builder: &mut FunctionBuilder<'_>) {
        let sp = load_field(builder, self.ctx, CTX_SP);
        builder.def_var(sp_var(), sp);
    }
}

/// Branch to a fatal guard failure unless `ok` is set
///
/// The stack cursor is published first so the report shows where native
/// code stood.
pub(crate) fn guard(
    builder: &mut FunctionBuilder<'_>,
    helpers: &HelperRefs,
    ctx: Value,
    ok: Value,
    reason: GuardFailure,
) {
    let pass = builder.create_block();
    let fail = builder.create_block();
    builder.ins().brif(ok, pass, &[], fail, &[]);

    builder.switch_to_block(fail);
    let sp = builder.use_var(sp_var());
    store_field(builder, ctx, CTX_SP, sp);
    let code = builder.ins().iconst(types::I64, reason as i64);
    call_helper(builder, helpers, RuntimeHelper::GuardFailed, &[ctx, code]);
    // The helper does not return.
    let zero = builder.ins().iconst(types::I64, 0);
    builder.ins().return_(&[zero]);

    builder.switch_to_block(pass);
}

/// Native call depth check made on entry by both tiers
pub(crate) fn depth_guard(builder: &mut FunctionBuilder<'_>, helpers: &HelperRefs, ctx: Value) {
    let depth = load_field(builder, ctx, CTX_DEPTH);
    let max = load_field(builder, ctx, CTX_MAX_DEPTH);
    let ok = builder.ins().icmp(IntCC::SignedLessThan, depth, max);
    guard(builder, helpers, ctx, ok, GuardFailure::Depth);
}

/// Adjust the native call depth by `delta`
pub(crate) fn bump_depth(builder: &mut FunctionBuilder<'_>, ctx: Value, delta: i64) {
    let depth = load_field(builder, ctx, CTX_DEPTH);
    let depth = builder.ins().iadd_imm(depth, delta);
    store_field(builder, ctx, CTX_DEPTH, depth);
}

/// Instruction indices that start a native basic block
///
/// Jump targets, fall-through successors of conditional jumps, instructions
/// following an unconditional transfer, and the routine's start.
pub(crate) fn label_sites(block: &Block, start_ip: usize) -> BTreeSet<usize> {
    let mut sites = BTreeSet::new();
    sites.insert(start_ip);
    for (ip, inst) in block.instructions().iter().enumerate() {
        if let Some(target) = inst.opcode.jump_target() {
            sites.insert(target);
            sites.insert(ip + 1);
        }
        if inst.opcode == Opcode::Rtrn {
            sites.insert(ip + 1);
        }
    }
    sites.retain(|ip| *ip < block.len());
    sites
}

/// Create a native block per label site
pub(crate) fn create_labels(
    builder: &mut FunctionBuilder<'_>,
    sites: &BTreeSet<usize>,
) -> HashMap<usize, Label> {
    sites.iter().map(|ip| (*ip, builder.create_block())).collect()
}

fn as_float(builder: &mut FunctionBuilder<'_>, value: Value) -> Value {
    builder.ins().bitcast(types::F64, MemFlags::new(), value)
}

fn as_word(builder: &mut FunctionBuilder<'_>, value: Value) -> Value {
    builder.ins().bitcast(types::I64, MemFlags::new(), value)
}

fn flag(builder: &mut FunctionBuilder<'_>, cond: Value) -> Value {
    builder.ins().uextend(types::I64, cond)
}

/// Lower a two-operand opcode; `left` was on top of the stack
///
/// Returns `None` for opcodes that are not pure binary operations.
/// Integer division traps natively on a zero divisor or overflow.
pub(crate) fn binary(
    builder: &mut FunctionBuilder<'_>,
    helpers: &HelperRefs,
    opcode: Opcode,
    left: Value,
    right: Value,
) -> Option<Value> {
    use Opcode::*;

    let int_cc = match opcode {
        LeInt => Some(IntCC::SignedLessThan),
        LeqInt => Some(IntCC::SignedLessThanOrEqual),
        GeInt => Some(IntCC::SignedGreaterThan),
        GeqInt => Some(IntCC::SignedGreaterThanOrEqual),
        EqInt => Some(IntCC::Equal),
        NeqInt => Some(IntCC::NotEqual),
        _ => None,
    };
    if let Some(cc) = int_cc {
        let cond = builder.ins().icmp(cc, left, right);
        return Some(flag(builder, cond));
    }

    let float_cc = match opcode {
        LeFloat => Some(FloatCC::LessThan),
        LeqFloat => Some(FloatCC::LessThanOrEqual),
        GeFloat => Some(FloatCC::GreaterThan),
        GeqFloat => Some(FloatCC::GreaterThanOrEqual),
        EqFloat => Some(FloatCC::Equal),
        NeqFloat => Some(FloatCC::NotEqual),
        _ => None,
    };
    if let Some(cc) = float_cc {
        let l = as_float(builder, left);
        let r = as_float(builder, right);
        let cond = builder.ins().fcmp(cc, l, r);
        return Some(flag(builder, cond));
    }

    let value = match opcode {
        AddInt => builder.ins().iadd(left, right),
        SubInt => builder.ins().isub(left, right),
        MulInt => builder.ins().imul(left, right),
        DivInt => builder.ins().sdiv(left, right),
        ModInt => builder.ins().srem(left, right),
        AndInt => builder.ins().band(left, right),
        OrInt => builder.ins().bor(left, right),
        LogicalAnd | LogicalOr => {
            let l = builder.ins().icmp_imm(IntCC::NotEqual, left, 0);
            let r = builder.ins().icmp_imm(IntCC::NotEqual, right, 0);
            let cond = if opcode == LogicalAnd {
                builder.ins().band(l, r)
            } else {
                builder.ins().bor(l, r)
            };
            flag(builder, cond)
        }
        AddFloat | SubFloat | MulFloat | DivFloat | ModFloat => {
            let l = as_float(builder, left);
            let r = as_float(builder, right);
            let result = match opcode {
                AddFloat => builder.ins().fadd(l, r),
                SubFloat => builder.ins().fsub(l, r),
                MulFloat => builder.ins().fmul(l, r),
                DivFloat => builder.ins().fdiv(l, r),
                _ => call_helper(builder, helpers, RuntimeHelper::Fmod, &[l, r])?,
            };
            as_word(builder, result)
        }
        _ => return None,
    };
    Some(value)
}

/// Lower a literal opcode
pub(crate) fn literal(builder: &mut FunctionBuilder<'_>, opcode: Opcode) -> Option<Value> {
    let value = match opcode {
        Opcode::LitInt(v) => builder.ins().iconst(types::I64, v),
        Opcode::LitFloat(v) => builder.ins().iconst(types::I64, v.to_bits() as i64),
        Opcode::LitChar(c) => builder.ins().iconst(types::I64, c as i64),
        _ => return None,
    };
    Some(value)
}

/// `F2I` / `I2F`
pub(crate) fn convert(builder: &mut FunctionBuilder<'_>, opcode: Opcode, value: Value) -> Option<Value> {
    match opcode {
        Opcode::F2I => {
            let f = as_float(builder, value);
            Some(builder.ins().fcvt_to_sint_sat(types::I64, f))
        }
        Opcode::I2F => {
            let f = builder.ins().fcvt_from_sint(types::F64, value);
            Some(as_word(builder, f))
        }
        _ => None,
    }
}

/// `LIT_LOAD_ADD/SUB/LE` once the local has been read
pub(crate) fn fused(builder: &mut FunctionBuilder<'_>, opcode: Opcode, local: Value) -> Option<Value> {
    match opcode {
        Opcode::LitLoadAdd(_, lit) => Some(builder.ins().iadd_imm(local, lit)),
        Opcode::LitLoadSub(_, lit) => Some(builder.ins().iadd_imm(local, lit.wrapping_neg())),
        Opcode::LitLoadLe(_, lit) => {
            let cond = builder.ins().icmp_imm(IntCC::SignedLessThan, local, lit);
            Some(flag(builder, cond))
        }
        _ => None,
    }
}

/// The print helper for a print opcode
pub(crate) fn print_helper(opcode: Opcode) -> Option<RuntimeHelper> {
    match opcode {
        Opcode::PrintInt => Some(RuntimeHelper::PrintInt),
        Opcode::PrintFloat => Some(RuntimeHelper::PrintFloat),
        Opcode::PrintChar => Some(RuntimeHelper::PrintChar),
        _ => None,
    }
}
