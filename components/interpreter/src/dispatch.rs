//! Dispatch loop for bytecode execution
//!
//! A fetch/dispatch loop over the opcode tag. Each handler pops a fixed
//! number of operands, touches at most one local slot, and falls through
//! to the next fetch. Calls and returns switch the current block without
//! host recursion; hot calls and hot backedges are promoted here.

use bytecode_system::{BlockId, JitTier, Opcode, Program};
use core_types::{ErrorKind, ValueKind, Variant, VmError, VmResult};
use memory_manager::FieldWidth;

use crate::vm::Machine;

impl Machine {
    /// Interpret from the entry block until it returns
    pub(crate) fn run(&mut self) -> VmResult<()> {
        let mut block = self.entry;
        let mut ip = 0usize;

        loop {
            self.current = block;
            let opcode = match self.program.block(block).instruction(ip) {
                Some(inst) => inst.opcode,
                None => {
                    return Err(VmError::runtime(format!(
                        "execution ran past the end of '{}'",
                        self.program.block(block).name()
                    )))
                }
            };
            ip += 1;

            match opcode {
                Opcode::LitInt(v) => self.state.push(v)?,
                Opcode::LitFloat(v) => self.state.push_value(Variant::Float(v))?,
                Opcode::LitChar(c) => self.state.push_value(Variant::Char(c))?,

                Opcode::LoadInt(slot)
                | Opcode::LoadFloat(slot)
                | Opcode::LoadChar(slot)
                | Opcode::LoadAry(slot) => {
                    let value = self.state.load(slot)?;
                    self.state.push(value)?;
                }
                Opcode::StoreInt(slot)
                | Opcode::StoreFloat(slot)
                | Opcode::StoreChar(slot)
                | Opcode::StoreAry(slot) => {
                    let value = self.state.pop()?;
                    self.state.store(slot, value)?;
                }

                Opcode::AddInt => self.binary_int(i64::wrapping_add)?,
                Opcode::SubInt => self.binary_int(i64::wrapping_sub)?,
                Opcode::MulInt => self.binary_int(i64::wrapping_mul)?,
                Opcode::DivInt => {
                    let (l, r) = self.pop_pair()?;
                    let value = l.checked_div(r).ok_or_else(|| arithmetic(l, r, "/"))?;
                    self.state.push(value)?;
                }
                Opcode::ModInt => {
                    let (l, r) = self.pop_pair()?;
                    let value = l.checked_rem(r).ok_or_else(|| arithmetic(l, r, "%"))?;
                    self.state.push(value)?;
                }
                Opcode::AndInt => self.binary_int(|l, r| l & r)?,
                Opcode::OrInt => self.binary_int(|l, r| l | r)?,

                Opcode::AddFloat => self.binary_float(|l, r| l + r)?,
                Opcode::SubFloat => self.binary_float(|l, r| l - r)?,
                Opcode::MulFloat => self.binary_float(|l, r| l * r)?,
                Opcode::DivFloat => self.binary_float(|l, r| l / r)?,
                Opcode::ModFloat => self.binary_float(|l, r| l % r)?,

                Opcode::LeInt => self.compare_int(|l, r| l < r)?,
                Opcode::LeqInt => self.compare_int(|l, r| l <= r)?,
                Opcode::GeInt => self.compare_int(|l, r| l > r)?,
                Opcode::GeqInt => self.compare_int(|l, r| l >= r)?,
                Opcode::EqInt => self.compare_int(|l, r| l == r)?,
                Opcode::NeqInt => self.compare_int(|l, r| l != r)?,

                Opcode::LeFloat => self.compare_float(|l, r| l < r)?,
                Opcode::LeqFloat => self.compare_float(|l, r| l <= r)?,
                Opcode::GeFloat => self.compare_float(|l, r| l > r)?,
                Opcode::GeqFloat => self.compare_float(|l, r| l >= r)?,
                Opcode::EqFloat => self.compare_float(|l, r| l == r)?,
                Opcode::NeqFloat => self.compare_float(|l, r| l != r)?,

                Opcode::LogicalAnd => self.compare_int(|l, r| l != 0 && r != 0)?,
                Opcode::LogicalOr => self.compare_int(|l, r| l != 0 || r != 0)?,

                Opcode::Tjmp(target) => {
                    if self.state.pop()? != 0 {
                        ip = target;
                    }
                }
                Opcode::Fjmp(target) => {
                    if self.state.pop()? == 0 {
                        ip = target;
                    }
                }
                Opcode::Ujmp(target) => {
                    let at = ip - 1;
                    if target < at && self.hot_backedge(block, at, target)? {
                        // The bounced routine finished this activation.
                        match self.state.leave_call() {
                            Some(frame) => {
                                block = frame.return_block;
                                ip = frame.return_ip;
                            }
                            None => return Ok(()),
                        }
                        continue;
                    }
                    ip = target;
                }
                Opcode::Lbl(label) => {
                    return Err(VmError::runtime(format!(
                        "label {} reached at runtime in '{}'",
                        label,
                        self.program.block(block).name()
                    )))
                }

                Opcode::PrintInt => {
                    let value = self.state.pop_value(ValueKind::Int)?;
                    self.runtime.print(value)?;
                }
                Opcode::PrintFloat => {
                    let value = self.state.pop_value(ValueKind::Float)?;
                    self.runtime.print(value)?;
                }
                Opcode::PrintChar => {
                    let value = self.state.pop_value(ValueKind::Char)?;
                    self.runtime.print(value)?;
                }

                Opcode::NewAry(len) => {
                    let handle = self.runtime.new_array(len, &self.state.roots())?;
                    self.state.push(handle)?;
                }
                Opcode::StoreAryElmInt(slot)
                | Opcode::StoreAryElmChar(slot)
                | Opcode::StoreAryElmFloat(slot) => {
                    let index = self.state.pop()?;
                    let value = self.state.pop()?;
                    let array = self.state.load(slot)?;
                    self.runtime.array_store(array, index, value)?;
                }
                Opcode::LoadAryElmInt(slot)
                | Opcode::LoadAryElmChar(slot)
                | Opcode::LoadAryElmFloat(slot) => {
                    let index = self.state.pop()?;
                    let array = self.state.load(slot)?;
                    let value = self.runtime.array_load(array, index)?;
                    self.state.push(value)?;
                }
                Opcode::CpyAryChar(string) => {
                    let array = self.state.pop()?;
                    self.runtime.copy_string(array, string)?;
                    self.state.push(array)?;
                }
                Opcode::PrintAryChar => {
                    let array = self.state.pop()?;
                    self.runtime.print_char_array(array)?;
                }

                Opcode::Malloc => {
                    let size = self.state.pop()?;
                    let handle = self.runtime.malloc(size, &self.state.roots())?;
                    self.state.push(handle)?;
                }
                Opcode::StructStoreInt(offset) | Opcode::StructStoreFloat(offset) => {
                    self.struct_store(offset, FieldWidth::Word)?
                }
                Opcode::StructStoreChar(offset) => self.struct_store(offset, FieldWidth::Byte)?,
                Opcode::StructLoadInt(offset) | Opcode::StructLoadFloat(offset) => {
                    self.struct_load(offset, FieldWidth::Word)?
                }
                Opcode::StructLoadChar(offset) => self.struct_load(offset, FieldWidth::Byte)?,

                Opcode::F2I => {
                    let value = self.state.pop_float()?;
                    self.state.push(value as i64)?;
                }
                Opcode::I2F => {
                    let value = self.state.pop()?;
                    self.state.push_float(value as f64)?;
                }

                Opcode::Call(callee) => {
                    let callee_slots = self.program.block(callee).memory_slots();
                    self.state.enter_call(ip, block, callee_slots)?;
                    block = callee;
                    ip = 0;
                    self.current = callee;
                    self.hot_call(callee)?;
                }
                Opcode::CallNative(callee) => self.call_native(callee)?,
                Opcode::Rtrn => match self.state.leave_call() {
                    Some(frame) => {
                        block = frame.return_block;
                        ip = frame.return_ip;
                    }
                    None => return Ok(()),
                },

                Opcode::LitLoadAdd(slot, lit) => {
                    let value = self.state.load(slot)?.wrapping_add(lit);
                    self.state.push(value)?;
                }
                Opcode::LitLoadSub(slot, lit) => {
                    let value = self.state.load(slot)?.wrapping_sub(lit);
                    self.state.push(value)?;
                }
                Opcode::LitLoadLe(slot, lit) => {
                    let value = (self.state.load(slot)? < lit) as i64;
                    self.state.push(value)?;
                }
            }
        }
    }

    /// Pop the left operand (top) and then the right operand.
    fn pop_pair(&mut self) -> VmResult<(i64, i64)> {
        let left = self.state.pop()?;
        let right = self.state.pop()?;
        Ok((left, right))
    }

    fn binary_int(&mut self, op: impl Fn(i64, i64) -> i64) -> VmResult<()> {
        let (l, r) = self.pop_pair()?;
        self.state.push(op(l, r))
    }

    fn binary_float(&mut self, op: impl Fn(f64, f64) -> f64) -> VmResult<()> {
        let l = self.state.pop_float()?;
        let r = self.state.pop_float()?;
        self.state.push_float(op(l, r))
    }

    fn compare_int(&mut self, op: impl Fn(i64, i64) -> bool) -> VmResult<()> {
        let (l, r) = self.pop_pair()?;
        self.state.push(op(l, r) as i64)
    }

    fn compare_float(&mut self, op: impl Fn(f64, f64) -> bool) -> VmResult<()> {
        let l = self.state.pop_float()?;
        let r = self.state.pop_float()?;
        self.state.push(op(l, r) as i64)
    }

    fn struct_store(&mut self, offset: usize, width: FieldWidth) -> VmResult<()> {
        let handle = self.state.pop()?;
        let value = self.state.pop()?;
        self.runtime.struct_store(handle, offset, width, value)
    }

    fn struct_load(&mut self, offset: usize, width: FieldWidth) -> VmResult<()> {
        let handle = self.state.pop()?;
        let value = self.runtime.struct_load(handle, offset, width)?;
        self.state.push(value)
    }

    /// Count an interpreted call and compile the callee once it is hot.
    fn hot_call(&mut self, callee: BlockId) -> VmResult<()> {
        let hotness = self.program.block_mut(callee).record_call();
        if hotness != self.config.call_hotness
            || self.program.block(callee).tier() != JitTier::None
        {
            return Ok(());
        }
        let Some(jit) = self.jit.as_deref_mut() else {
            return Ok(());
        };
        log::debug!("hot call {}", self.program.block(callee).name());
        let installed = match jit.compile(&mut self.program, callee, JitTier::Basic) {
            Ok(installed) => installed,
            Err(e) => return Err(compile_failed(&self.program, callee, JitTier::Basic, e)),
        };
        self.record_installs(JitTier::Basic, installed);
        Ok(())
    }

    /// Count a backward jump; once hot, run the rest of the activation in
    /// a throwaway routine and compile the whole block.
    ///
    /// Returns `true` when the activation has been completed natively.
    fn hot_backedge(&mut self, block: BlockId, at: usize, target: usize) -> VmResult<bool> {
        let hotness = self.program.block_mut(block).record_backedge(at);
        if hotness != self.config.backedge_hotness || self.jit.is_none() {
            return Ok(false);
        }
        log::debug!(
            "hot backedge at {}:{}",
            self.program.block(block).name(),
            at
        );

        let routine = match self.jit.as_deref_mut() {
            Some(jit) => match jit.compile_entry(&mut self.program, block, target) {
                Ok(routine) => routine,
                Err(e) => return Err(compile_failed(&self.program, block, JitTier::Basic, e)),
            },
            None => return Ok(false),
        };
        self.record_installs(JitTier::Basic, routine.installed);
        let base = self.state.window().base;
        self.invoke(routine.code.entry(), base)?;
        drop(routine);
        self.stats.backedge_bounces += 1;

        if self.program.block(block).tier() == JitTier::None {
            if let Some(jit) = self.jit.as_deref_mut() {
                let installed = match jit.compile(&mut self.program, block, JitTier::Basic) {
                    Ok(installed) => installed,
                    Err(e) => return Err(compile_failed(&self.program, block, JitTier::Basic, e)),
                };
                self.record_installs(JitTier::Basic, installed);
            }
        }
        Ok(true)
    }

    /// Call a compiled block, managing its window on its behalf.
    fn call_native(&mut self, callee: BlockId) -> VmResult<()> {
        self.maybe_optimize(callee)?;

        let target = self.program.block(callee);
        let entry = target.native().ok_or_else(|| {
            VmError::runtime(format!("'{}' has no native code", target.name()))
        })?;
        let tier = target.tier();
        let window = self.state.native_window(target.memory_slots())?;

        let result = self.invoke(entry, window.base)?;
        if tier == JitTier::Optimizing {
            self.state.push(result)?;
        }
        Ok(())
    }

    fn maybe_optimize(&mut self, callee: BlockId) -> VmResult<()> {
        let hotness = self.program.block_mut(callee).record_call();
        if !self.config.optimize_enabled
            || hotness < self.config.optimize_hotness
            || self.program.block(callee).tier() != JitTier::Basic
        {
            return Ok(());
        }
        let Some(jit) = self.jit.as_deref_mut() else {
            return Ok(());
        };
        // Eligibility is rechecked on later calls: callees may be optimized since.
        if !jit.can_optimize(&self.program, callee) {
            if hotness == self.config.optimize_hotness {
                log::debug!(
                    "'{}' stays at the basic tier for now",
                    self.program.block(callee).name()
                );
            }
            return Ok(());
        }
        log::debug!("optimizing {}", self.program.block(callee).name());
        let installed = match jit.compile(&mut self.program, callee, JitTier::Optimizing) {
            Ok(installed) => installed,
            Err(e) => return Err(compile_failed(&self.program, callee, JitTier::Optimizing, e)),
        };
        self.record_installs(JitTier::Optimizing, installed);
        Ok(())
    }
}

fn compile_failed(program: &Program, block: BlockId, tier: JitTier, error: VmError) -> VmError {
    log::warn!(
        "{} compilation of '{}' failed: {}",
        tier,
        program.block(block).name(),
        error
    );
    error
}

fn arithmetic(left: i64, right: i64, op: &str) -> VmError {
    let reason = if right == 0 { "division by zero" } else { "overflow" };
    VmError::new(
        ErrorKind::Arithmetic,
        format!("{} {} {}: {}", left, op, right, reason),
    )
}
