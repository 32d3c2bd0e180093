//! Optimizing JIT compiler
//!
//! Translates a block with its locals held in SSA variables instead of the
//! memory array, and its operands on a compile-time stack that only spills
//! to the shared operand stack at control-flow boundaries and calls. The
//! routine returns its top value in the return register.
//!
//! A block qualifies only when every call it makes lands in optimized code
//! (or the block itself), it never touches the heap, and every return
//! carries a value.

use std::collections::HashMap;

use bytecode_system::{Block, BlockId, JitTier, NativeCode, Opcode, Program};
use cranelift_codegen::ir::{types, Block as Label, FuncRef, InstBuilder, SigRef, Value};
use cranelift_frontend::{FunctionBuilder, Variable};
use cranelift_module::Module;
use core_types::{VmError, VmResult};

use crate::codegen::{self, HelperRefs, SharedStack};
use crate::cranelift_backend::{CraneliftBackend, RoutineModule};

/// Statistics for optimizing JIT compilation
#[derive(Debug, Clone, Default)]
pub struct OptimizingStats {
    /// Number of blocks compiled and installed
    pub functions_compiled: u64,
    /// Operand stack round trips avoided by keeping values in registers
    pub spills_avoided: u64,
}

/// Optimizing JIT compiler
///
/// Characteristics:
/// - Locals live in registers for the whole activation
/// - Operands stay in registers within a straight-line run
/// - Calls go straight to the callee's optimized entry
/// - No memory window: optimized code never reads the memory array
pub struct OptimizingJIT {
    backend: CraneliftBackend,
    stats: OptimizingStats,
}

impl OptimizingJIT {
    /// Create a new optimizing JIT compiler
    pub fn new() -> VmResult<Self> {
        Ok(Self {
            backend: CraneliftBackend::new()?,
            stats: OptimizingStats::default(),
        })
    }

    /// Check whether `block` can be optimized now
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The block is eligible
    /// * `Err(VmError)` - A compile error naming the first obstacle
    pub fn check(program: &Program, id: BlockId) -> VmResult<()> {
        let block = program.block(id);
        let reject = |why: String| Err(VmError::compile(format!("cannot optimize '{}': {}", block.name(), why)));

        if block.tier() != JitTier::Basic {
            return reject(format!("block is at tier {}, not basic", block.tier()));
        }
        let targets: Vec<usize> = block
            .instructions()
            .iter()
            .filter_map(|inst| inst.opcode.jump_target())
            .collect();

        for (ip, inst) in block.instructions().iter().enumerate() {
            let opcode = inst.opcode;
            if opcode.touches_heap() {
                return reject(format!("{} at {} touches the heap", opcode.mnemonic(), ip));
            }
            if let Opcode::Lbl(label) = opcode {
                return reject(format!("label {} left at {}", label, ip));
            }
            if let Some(callee) = opcode.callee() {
                let target = program.block(callee);
                if callee != id && target.tier() != JitTier::Optimizing {
                    return reject(format!("callee '{}' is not optimized", target.name()));
                }
            }
            if opcode == Opcode::Rtrn {
                let produced = ip
                    .checked_sub(1)
                    .map(|prev| produces_value(block.instructions()[prev].opcode))
                    .unwrap_or(false);
                if !produced || targets.contains(&ip) {
                    return reject(format!("return at {} may not carry a value", ip));
                }
            }
        }
        Ok(())
    }

    /// Compile an eligible `block` and install it
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Always 1: optimized compilation never pulls in callees
    /// * `Err(VmError)` - If [`OptimizingJIT::check`] rejects the block
    pub fn compile(&mut self, program: &mut Program, id: BlockId) -> VmResult<usize> {
        Self::check(program, id)?;
        let (code, kept) = self.lower(program, id)?;
        program.block_mut(id).install(JitTier::Optimizing, code)?;
        self.stats.functions_compiled += 1;
        self.stats.spills_avoided += kept;
        log::debug!("optimizing tier installed for {}", program.block(id).name());
        Ok(1)
    }

    /// Get compilation statistics
    pub fn stats(&self) -> &OptimizingStats {
        &self.stats
    }

    fn lower(&mut self, program: &Program, id: BlockId) -> VmResult<(NativeCode, u64)> {
        let block = program.block(id);
        let mut routine = self.backend.routine(block.name())?;
        let kept;
        {
            let RoutineModule {
                module,
                helpers,
                id: func_id,
                signature,
                ctx,
                builder_ctx,
            } = &mut routine;
            let mut builder = FunctionBuilder::new(&mut ctx.func, builder_ctx);
            let helpers = HelperRefs::import(module, helpers, builder.func);
            let own = module.declare_func_in_func(*func_id, builder.func);
            let call_sig = builder.import_signature(signature.clone());

            let lowering = Lowering {
                builder: &mut builder,
                helpers: &helpers,
                program,
                block,
                id,
                own,
                call_sig,
                operands: Vec::new(),
                kept: 0,
            };
            kept = lowering.run()?;
            builder.seal_all_blocks();
            builder.finalize();
        }
        Ok((routine.finish()?, kept))
    }
}

impl std::fmt::Debug for OptimizingJIT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizingJIT")
            .field("backend", &self.backend)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Whether `opcode` leaves a fresh value on top of the stack
fn produces_value(opcode: Opcode) -> bool {
    use Opcode::*;
    !matches!(
        opcode,
        StoreInt(_)
            | StoreFloat(_)
            | StoreChar(_)
            | StoreAry(_)
            | Tjmp(_)
            | Fjmp(_)
            | Ujmp(_)
            | Lbl(_)
            | PrintInt
            | PrintFloat
            | PrintChar
            | PrintAryChar
            | StoreAryElmInt(_)
            | StoreAryElmChar(_)
            | StoreAryElmFloat(_)
            | StructStoreInt(_)
            | StructStoreFloat(_)
            | StructStoreChar(_)
            | Rtrn
    )
}

fn local(slot: usize) -> Variable {
    Variable::from_u32(slot as u32 + 1)
}

struct Lowering<'a, 'f> {
    builder: &'a mut FunctionBuilder<'f>,
    helpers: &'a HelperRefs,
    program: &'a Program,
    block: &'a Block,
    id: BlockId,
    own: FuncRef,
    call_sig: SigRef,
    /// Operands not yet written to the shared stack, top last
    operands: Vec<Value>,
    kept: u64,
}

impl Lowering<'_, '_> {
    fn run(mut self) -> VmResult<u64> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        let ctx = self.builder.block_params(entry)[0];

        let stack = SharedStack::enter(self.builder, ctx);
        codegen::depth_guard(self.builder, self.helpers, ctx);
        let zero = self.builder.ins().iconst(types::I64, 0);
        for slot in 0..self.block.memory_slots() {
            self.builder.declare_var(local(slot), types::I64);
            self.builder.def_var(local(slot), zero);
        }

        let block = self.block;
        let sites = codegen::label_sites(block, 0);
        let labels = codegen::create_labels(self.builder, &sites);
        let start = self.label(&labels, 0)?;
        self.builder.ins().jump(start, &[]);

        let mut open = false;
        for (ip, inst) in block.instructions().iter().enumerate() {
            match labels.get(&ip) {
                Some(label) => {
                    if open {
                        self.spill(stack);
                        self.builder.ins().jump(*label, &[]);
                    }
                    self.builder.switch_to_block(*label);
                }
                None if !open => continue,
                None => {}
            }
            open = self.instruction(ctx, stack, &labels, ip, inst.opcode)?;
        }
        if open {
            return Err(VmError::compile(format!(
                "'{}' can run past its last instruction",
                block.name()
            )));
        }
        Ok(self.kept)
    }

    fn label(&self, labels: &HashMap<usize, Label>, ip: usize) -> VmResult<Label> {
        labels.get(&ip).copied().ok_or_else(|| {
            VmError::compile(format!(
                "'{}' can run past its last instruction",
                self.block.name()
            ))
        })
    }

    fn push(&mut self, value: Value) {
        self.operands.push(value);
    }

    /// Pop a register operand, falling back to the shared stack for
    /// values pushed before this run (arguments, spilled operands).
    fn pop(&mut self, stack: SharedStack) -> Value {
        match self.operands.pop() {
            Some(value) => {
                self.kept += 1;
                value
            }
            None => stack.pop(self.builder, self.helpers),
        }
    }

    /// Write pending operands to the shared stack, bottom first
    fn spill(&mut self, stack: SharedStack) {
        for value in std::mem::take(&mut self.operands) {
            stack.push(self.builder, self.helpers, value);
        }
    }

    fn slot(&self, slot: usize) -> VmResult<Variable> {
        if slot >= self.block.memory_slots() {
            return Err(VmError::compile(format!("slot {} out of range", slot)));
        }
        Ok(local(slot))
    }

    fn local(&mut self, slot: usize) -> VmResult<Value> {
        let var = self.slot(slot)?;
        Ok(self.builder.use_var(var))
    }

    fn instruction(
        &mut self,
        ctx: Value,
        stack: SharedStack,
        labels: &HashMap<usize, Label>,
        ip: usize,
        opcode: Opcode,
    ) -> VmResult<bool> {
        use Opcode::*;

        if let Some(value) = codegen::literal(self.builder, opcode) {
            self.push(value);
            return Ok(true);
        }
        if let Some(helper) = codegen::print_helper(opcode) {
            let value = self.pop(stack);
            codegen::call_helper(self.builder, self.helpers, helper, &[ctx, value]);
            return Ok(true);
        }

        match opcode {
            LoadInt(slot) | LoadFloat(slot) | LoadChar(slot) => {
                let value = self.local(slot)?;
                self.push(value);
            }
            StoreInt(slot) | StoreFloat(slot) | StoreChar(slot) => {
                let var = self.slot(slot)?;
                let value = self.pop(stack);
                self.builder.def_var(var, value);
            }
            LitLoadAdd(slot, _) | LitLoadSub(slot, _) | LitLoadLe(slot, _) => {
                let value = self.local(slot)?;
                if let Some(value) = codegen::fused(self.builder, opcode, value) {
                    self.push(value);
                }
            }
            F2I | I2F => {
                let value = self.pop(stack);
                if let Some(value) = codegen::convert(self.builder, opcode, value) {
                    self.push(value);
                }
            }

            Tjmp(target) | Fjmp(target) => {
                let cond = self.pop(stack);
                self.spill(stack);
                let taken = self.label(labels, target)?;
                let next = self.label(labels, ip + 1)?;
                let (then_label, else_label) = match opcode {
                    Tjmp(_) => (taken, next),
                    _ => (next, taken),
                };
                self.builder
                    .ins()
                    .brif(cond, then_label, &[], else_label, &[]);
                return Ok(false);
            }
            Ujmp(target) => {
                self.spill(stack);
                let taken = self.label(labels, target)?;
                self.builder.ins().jump(taken, &[]);
                return Ok(false);
            }
            Rtrn => {
                let value = self.pop(stack);
                self.spill(stack);
                stack.flush(self.builder);
                self.builder.ins().return_(&[value]);
                return Ok(false);
            }

            Call(callee) | CallNative(callee) => {
                let value = self.call(ctx, stack, callee)?;
                self.push(value);
            }

            _ if opcode.touches_heap() || matches!(opcode, Lbl(_)) => {
                return Err(VmError::compile(format!(
                    "cannot optimize {} in '{}'",
                    opcode,
                    self.block.name()
                )))
            }
            _ => {
                let left = self.pop(stack);
                let right = self.pop(stack);
                let value = codegen::binary(self.builder, self.helpers, opcode, left, right)
                    .ok_or_else(|| {
                        VmError::compile(format!("cannot optimize {} in '{}'", opcode, self.block.name()))
                    })?;
                self.push(value);
            }
        }
        Ok(true)
    }

    /// Call an optimized block; arguments travel on the shared stack and
    /// the result comes back in the return register.
    fn call(&mut self, ctx: Value, stack: SharedStack, callee: BlockId) -> VmResult<Value> {
        self.spill(stack);
        stack.flush(self.builder);
        codegen::bump_depth(self.builder, ctx, 1);

        let call = if callee == self.id {
            self.builder.ins().call(self.own, &[ctx])
        } else {
            let target = self.program.block(callee);
            let entry = match (target.tier(), target.native()) {
                (JitTier::Optimizing, Some(entry)) => entry,
                _ => {
                    return Err(VmError::compile(format!(
                        "callee '{}' is not optimized",
                        target.name()
                    )))
                }
            };
            let entry = self.builder.ins().iconst(types::I64, entry as usize as i64);
            self.builder.ins().call_indirect(self.call_sig, entry, &[ctx])
        };
        let result = self.builder.inst_results(call)[0];

        codegen::bump_depth(self.builder, ctx, -1);
        stack.reload(self.builder);
        Ok(result)
    }
}
