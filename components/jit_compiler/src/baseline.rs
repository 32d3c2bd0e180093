//! Baseline JIT compiler
//!
//! Instruction-by-instruction translation of a block over the same operand
//! stack and memory window the interpreter uses, so a block can switch
//! tiers between any two activations. Every jump target becomes a native
//! label; heap access and printing go through the runtime helpers.

use std::collections::{HashMap, HashSet};

use bytecode_system::{Block, BlockId, JitTier, NativeCode, Opcode, Program};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, Block as Label, FuncRef, InstBuilder, MemFlags, SigRef, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::Module;
use core_types::{VmError, VmResult};
use interpreter::{width_code, EntryRoutine, GuardFailure, RuntimeHelper};
use memory_manager::FieldWidth;

use crate::codegen::{self, HelperRefs, SharedStack};
use crate::cranelift_backend::{CraneliftBackend, RoutineModule};

/// Statistics for baseline JIT compilation
#[derive(Debug, Clone, Default)]
pub struct BaselineStats {
    /// Number of blocks compiled and installed
    pub functions_compiled: u64,
    /// Number of throwaway mid-block routines compiled
    pub entry_routines: u64,
}

/// Baseline JIT compiler
///
/// Characteristics:
/// - One native routine per block, sharing the interpreter's stack and
///   memory window
/// - Not-yet-compiled callees are compiled first, recursively
/// - Calls between compiled blocks go through each callee's stable
///   baseline entry cell, so mutually recursive blocks link correctly
pub struct BaselineJIT {
    backend: CraneliftBackend,
    stats: BaselineStats,
}

impl BaselineJIT {
    /// Create a new baseline JIT compiler
    pub fn new() -> VmResult<Self> {
        Ok(Self {
            backend: CraneliftBackend::new()?,
            stats: BaselineStats::default(),
        })
    }

    /// Compile `block` and every uncompiled block it calls, install them
    /// and rewrite their call sites to native calls
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of blocks installed; 0 if `block` already
    ///   has native code
    /// * `Err(VmError)` - On a live label or a block that can run past its
    ///   last instruction
    ///
    /// # Example
    ///
    /// ```
    /// use bytecode_system::{assemble, JitTier};
    /// use jit_compiler::BaselineJIT;
    ///
    /// let mut program = assemble(".block main\n CALL f()\n RTRN\n.block f()\n RTRN\n").unwrap();
    /// let main = program.main().unwrap();
    /// let mut jit = BaselineJIT::new().unwrap();
    ///
    /// assert_eq!(jit.compile(&mut program, main).unwrap(), 2);
    /// assert_eq!(program.block(main).tier(), JitTier::Basic);
    /// ```
    pub fn compile(&mut self, program: &mut Program, block: BlockId) -> VmResult<usize> {
        let mut in_progress = HashSet::new();
        self.compile_tree(program, block, &mut in_progress)
    }

    fn compile_tree(
        &mut self,
        program: &mut Program,
        block: BlockId,
        in_progress: &mut HashSet<BlockId>,
    ) -> VmResult<usize> {
        if program.block(block).tier() != JitTier::None {
            return Ok(0);
        }
        in_progress.insert(block);

        let mut installed = 0;
        for callee in program.block(block).callees() {
            if !in_progress.contains(&callee) {
                installed += self.compile_tree(program, callee, in_progress)?;
            }
        }

        let code = self.lower(program, block, 0, true)?;
        program.block_mut(block).install(JitTier::Basic, code)?;
        let linked = program.link_native_calls(block);
        self.stats.functions_compiled += 1;
        log::debug!(
            "basic tier installed for {} ({} call sites linked)",
            program.block(block).name(),
            linked
        );
        Ok(installed + 1)
    }

    /// Compile a routine that enters `block` at `start_ip`
    ///
    /// The block itself and its callees are compiled and installed first;
    /// recursive calls made by the routine use the installed code.
    pub fn compile_entry(
        &mut self,
        program: &mut Program,
        block: BlockId,
        start_ip: usize,
    ) -> VmResult<EntryRoutine> {
        let installed = self.compile(program, block)?;
        let code = self.lower(program, block, start_ip, false)?;
        self.stats.entry_routines += 1;
        log::debug!(
            "entry routine for {} at {}",
            program.block(block).name(),
            start_ip
        );
        Ok(EntryRoutine { code, installed })
    }

    /// Get compilation statistics
    pub fn stats(&self) -> &BaselineStats {
        &self.stats
    }

    fn lower(
        &mut self,
        program: &Program,
        id: BlockId,
        start_ip: usize,
        direct_self_calls: bool,
    ) -> VmResult<NativeCode> {
        let block = program.block(id);
        if start_ip >= block.len() {
            return Err(VmError::compile(format!(
                "entry point {} outside '{}'",
                start_ip,
                block.name()
            )));
        }

        let mut routine = self.backend.routine(block.name())?;
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
            let own = direct_self_calls.then(|| module.declare_func_in_func(*func_id, builder.func));
            let call_sig = builder.import_signature(signature.clone());

            let lowering = Lowering {
                builder: &mut builder,
                helpers: &helpers,
                program,
                block,
                id,
                own,
                call_sig,
            };
            lowering.run(start_ip)?;
            builder.seal_all_blocks();
            builder.finalize();
        }
        routine.finish()
    }
}

impl std::fmt::Debug for BaselineJIT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineJIT")
            .field("backend", &self.backend)
            .field("stats", &self.stats)
            .finish()
    }
}

struct Lowering<'a, 'f> {
    builder: &'a mut FunctionBuilder<'f>,
    helpers: &'a HelperRefs,
    program: &'a Program,
    block: &'a Block,
    id: BlockId,
    own: Option<FuncRef>,
    call_sig: SigRef,
}

/// Values live for the whole routine
#[derive(Clone, Copy)]
struct Frame {
    ctx: Value,
    stack: SharedStack,
    mp: Value,
    locals: Value,
}

impl Lowering<'_, '_> {
    fn run(mut self, start_ip: usize) -> VmResult<()> {
        let frame = self.prologue();

        let block = self.block;
        let sites = codegen::label_sites(block, start_ip);
        let labels = codegen::create_labels(self.builder, &sites);
        let start = self.label(&labels, start_ip)?;
        self.builder.ins().jump(start, &[]);

        let mut open = false;
        for (ip, inst) in block.instructions().iter().enumerate() {
            match labels.get(&ip) {
                Some(label) => {
                    if open {
                        self.builder.ins().jump(*label, &[]);
                    }
                    self.builder.switch_to_block(*label);
                }
                None if !open => continue,
                None => {}
            }
            open = self.instruction(&frame, &labels, ip, inst.opcode)?;
        }
        if open {
            return Err(VmError::compile(format!(
                "'{}' can run past its last instruction",
                self.block.name()
            )));
        }
        Ok(())
    }

    /// Load the context, check the window and depth limits, and locate the
    /// memory window.
    fn prologue(&mut self) -> Frame {
        let builder = &mut *self.builder;
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let ctx = builder.block_params(entry)[0];

        let stack = SharedStack::enter(builder, ctx);
        let mp = codegen::load_field(builder, ctx, codegen::CTX_MP);
        let end = builder
            .ins()
            .iadd_imm(mp, self.block.memory_slots() as i64);
        let memory_len = codegen::load_field(builder, ctx, codegen::CTX_MEMORY_LEN);
        let ok = builder.ins().icmp(IntCC::SignedLessThanOrEqual, end, memory_len);
        codegen::guard(builder, self.helpers, ctx, ok, GuardFailure::Window);
        codegen::depth_guard(builder, self.helpers, ctx);

        let memory = codegen::load_field(builder, ctx, codegen::CTX_MEMORY);
        let offset = builder.ins().ishl_imm(mp, 3);
        let locals = builder.ins().iadd(memory, offset);
        Frame {
            ctx,
            stack,
            mp,
            locals,
        }
    }

    /// Byte offset of `slot` in the window; the window guard only covers
    /// `memory_slots` words.
    fn local_offset(&self, slot: usize) -> VmResult<i32> {
        let slots = self.block.memory_slots();
        if slot >= slots {
            return Err(VmError::compile(format!(
                "slot {} outside a window of {} slots in '{}'",
                slot,
                slots,
                self.block.name()
            )));
        }
        i32::try_from(slot * 8).map_err(|_| VmError::compile(format!("slot {} out of range", slot)))
    }

    fn load_local(&mut self, frame: &Frame, slot: usize) -> VmResult<Value> {
        let offset = self.local_offset(slot)?;
        Ok(self
            .builder
            .ins()
            .load(types::I64, MemFlags::trusted(), frame.locals, offset))
    }

    fn store_local(&mut self, frame: &Frame, slot: usize, value: Value) -> VmResult<()> {
        let offset = self.local_offset(slot)?;
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, frame.locals, offset);
        Ok(())
    }

    fn push(&mut self, frame: &Frame, value: Value) {
        frame.stack.push(self.builder, self.helpers, value);
    }

    fn pop(&mut self, frame: &Frame) -> Value {
        frame.stack.pop(self.builder, self.helpers)
    }

    fn helper(&mut self, helper: RuntimeHelper, args: &[Value]) -> Option<Value> {
        codegen::call_helper(self.builder, self.helpers, helper, args)
    }

    fn iconst(&mut self, value: i64) -> Value {
        self.builder.ins().iconst(types::I64, value)
    }

    fn label(&self, labels: &HashMap<usize, Label>, ip: usize) -> VmResult<Label> {
        labels.get(&ip).copied().ok_or_else(|| {
            VmError::compile(format!(
                "'{}' can run past its last instruction",
                self.block.name()
            ))
        })
    }

    /// Lower one instruction; returns whether control falls through.
    fn instruction(
        &mut self,
        frame: &Frame,
        labels: &HashMap<usize, Label>,
        ip: usize,
        opcode: Opcode,
    ) -> VmResult<bool> {
        use Opcode::*;

        if let Some(value) = codegen::literal(self.builder, opcode) {
            self.push(frame, value);
            return Ok(true);
        }
        if let Some(helper) = codegen::print_helper(opcode) {
            let value = self.pop(frame);
            self.helper(helper, &[frame.ctx, value]);
            return Ok(true);
        }

        match opcode {
            LoadInt(slot) | LoadFloat(slot) | LoadChar(slot) | LoadAry(slot) => {
                let value = self.load_local(frame, slot)?;
                self.push(frame, value);
            }
            StoreInt(slot) | StoreFloat(slot) | StoreChar(slot) | StoreAry(slot) => {
                let value = self.pop(frame);
                self.store_local(frame, slot, value)?;
            }
            LitLoadAdd(slot, _) | LitLoadSub(slot, _) | LitLoadLe(slot, _) => {
                let local = self.load_local(frame, slot)?;
                if let Some(value) = codegen::fused(self.builder, opcode, local) {
                    self.push(frame, value);
                }
            }
            F2I | I2F => {
                let value = self.pop(frame);
                if let Some(value) = codegen::convert(self.builder, opcode, value) {
                    self.push(frame, value);
                }
            }

            Tjmp(target) | Fjmp(target) => {
                let cond = self.pop(frame);
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
                let taken = self.label(labels, target)?;
                self.builder.ins().jump(taken, &[]);
                return Ok(false);
            }
            Lbl(label) => {
                return Err(VmError::compile(format!(
                    "label {} left in '{}'",
                    label,
                    self.block.name()
                )))
            }
            Rtrn => {
                frame.stack.flush(self.builder);
                let zero = self.iconst(0);
                self.builder.ins().return_(&[zero]);
                return Ok(false);
            }

            NewAry(len) => {
                frame.stack.flush(self.builder);
                let len = self.iconst(len as i64);
                let slots = self.iconst(self.block.memory_slots() as i64);
                if let Some(array) = self.helper(RuntimeHelper::NewArray, &[frame.ctx, len, slots]) {
                    self.push(frame, array);
                }
            }
            Malloc => {
                let size = self.pop(frame);
                frame.stack.flush(self.builder);
                let slots = self.iconst(self.block.memory_slots() as i64);
                if let Some(handle) = self.helper(RuntimeHelper::Malloc, &[frame.ctx, size, slots]) {
                    self.push(frame, handle);
                }
            }
            StoreAryElmInt(slot) | StoreAryElmChar(slot) | StoreAryElmFloat(slot) => {
                let index = self.pop(frame);
                let value = self.pop(frame);
                let array = self.load_local(frame, slot)?;
                self.helper(RuntimeHelper::ArrayStore, &[frame.ctx, array, index, value]);
            }
            LoadAryElmInt(slot) | LoadAryElmChar(slot) | LoadAryElmFloat(slot) => {
                let index = self.pop(frame);
                let array = self.load_local(frame, slot)?;
                if let Some(value) = self.helper(RuntimeHelper::ArrayLoad, &[frame.ctx, array, index]) {
                    self.push(frame, value);
                }
            }
            CpyAryChar(string) => {
                let array = self.pop(frame);
                let string = self.iconst(string as i64);
                self.helper(RuntimeHelper::CopyString, &[frame.ctx, array, string]);
                self.push(frame, array);
            }
            PrintAryChar => {
                let array = self.pop(frame);
                self.helper(RuntimeHelper::PrintCharArray, &[frame.ctx, array]);
            }
            StructStoreInt(offset) | StructStoreFloat(offset) => {
                self.struct_store(frame, offset, FieldWidth::Word)
            }
            StructStoreChar(offset) => self.struct_store(frame, offset, FieldWidth::Byte),
            StructLoadInt(offset) | StructLoadFloat(offset) => {
                self.struct_load(frame, offset, FieldWidth::Word)
            }
            StructLoadChar(offset) => self.struct_load(frame, offset, FieldWidth::Byte),

            Call(callee) | CallNative(callee) => self.call(frame, callee),

            _ => {
                let left = self.pop(frame);
                let right = self.pop(frame);
                let value = codegen::binary(self.builder, self.helpers, opcode, left, right)
                    .ok_or_else(|| {
                        VmError::compile(format!("cannot compile {} in '{}'", opcode, self.block.name()))
                    })?;
                self.push(frame, value);
            }
        }
        Ok(true)
    }

    fn struct_store(&mut self, frame: &Frame, offset: usize, width: FieldWidth) {
        let handle = self.pop(frame);
        let value = self.pop(frame);
        let offset = self.iconst(offset as i64);
        let width = self.iconst(width_code(width));
        self.helper(
            RuntimeHelper::StructStore,
            &[frame.ctx, handle, offset, width, value],
        );
    }

    fn struct_load(&mut self, frame: &Frame, offset: usize, width: FieldWidth) {
        let handle = self.pop(frame);
        let offset = self.iconst(offset as i64);
        let width = self.iconst(width_code(width));
        if let Some(value) = self.helper(RuntimeHelper::StructLoad, &[frame.ctx, handle, offset, width]) {
            self.push(frame, value);
        }
    }

    /// Call another block's baseline code with the callee window opened
    /// right after this one.
    fn call(&mut self, frame: &Frame, callee: BlockId) {
        frame.stack.flush(self.builder);
        let callee_mp = self
            .builder
            .ins()
            .iadd_imm(frame.mp, self.block.memory_slots() as i64);
        codegen::store_field(self.builder, frame.ctx, codegen::CTX_MP, callee_mp);
        codegen::bump_depth(self.builder, frame.ctx, 1);

        match self.own {
            Some(own) if callee == self.id => {
                self.builder.ins().call(own, &[frame.ctx]);
            }
            _ => {
                let cell = self.program.block(callee).baseline_entry_slot() as i64;
                let cell = self.iconst(cell);
                let entry = self
                    .builder
                    .ins()
                    .load(types::I64, MemFlags::trusted(), cell, 0);
                self.builder
                    .ins()
                    .call_indirect(self.call_sig, entry, &[frame.ctx]);
            }
        }

        codegen::store_field(self.builder, frame.ctx, codegen::CTX_MP, frame.mp);
        codegen::bump_depth(self.builder, frame.ctx, -1);
        frame.stack.reload(self.builder);
    }
}
