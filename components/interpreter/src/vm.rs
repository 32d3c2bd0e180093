//! The norn machine
//!
//! Main entry point for executing a frozen [`Program`].

use std::ffi::c_void;
use std::io::Write;

use bytecode_system::{BlockId, JitTier, Program};
use core_types::{NativeFn, VmError, VmResult};
use memory_manager::{GcStats, Memory};

use crate::config::VmConfig;
use crate::runtime::Runtime;
use crate::state::VmState;
use crate::tier::{JitBackend, PromotionStats};

/// Virtual machine executing one program
///
/// The machine owns the program, so blocks can change tier in place while
/// it runs. A JIT backend is optional; without one every block stays
/// interpreted.
///
/// # Example
///
/// ```
/// use bytecode_system::assemble;
/// use interpreter::{Machine, SharedOutput, VmConfig};
///
/// let program = assemble(".block main\n LIT_INT 2\n LIT_INT 40\n ADD_INT\n PRINT_INT\n RTRN\n").unwrap();
/// let output = SharedOutput::new();
/// let mut machine = Machine::new(program, VmConfig::default())
///     .unwrap()
///     .with_output(output.clone());
///
/// machine.execute().unwrap();
/// assert_eq!(output.contents(), "42");
/// ```
pub struct Machine {
    pub(crate) program: Program,
    pub(crate) state: VmState,
    pub(crate) runtime: Box<Runtime>,
    pub(crate) jit: Option<Box<dyn JitBackend>>,
    pub(crate) config: VmConfig,
    pub(crate) stats: PromotionStats,
    pub(crate) entry: BlockId,
    /// Block being interpreted, for error reports
    pub(crate) current: BlockId,
}

impl Machine {
    /// Create a machine for `program`
    ///
    /// # Returns
    ///
    /// * `Err(VmError)` - If the program has no `main` block
    pub fn new(program: Program, config: VmConfig) -> VmResult<Self> {
        let entry = program
            .main()
            .ok_or_else(|| VmError::runtime("program has no 'main' block"))?;
        let state = VmState::new(config.stack_size, program.total_memory_slots());
        let runtime = Runtime::new(
            Memory::new(config.gc_threshold),
            Box::new(std::io::stdout()),
            program.strings().to_vec(),
        );
        Ok(Self {
            program,
            state,
            runtime: Box::new(runtime),
            jit: None,
            config,
            stats: PromotionStats::default(),
            entry,
            current: entry,
        })
    }

    /// Send print output to `out` instead of stdout
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.runtime.set_output(Box::new(out));
        self
    }

    /// Attach a JIT backend
    ///
    /// Ignored when the configuration disables the JIT.
    pub fn with_jit(mut self, jit: Box<dyn JitBackend>) -> Self {
        if self.config.jit_enabled {
            self.jit = Some(jit);
        }
        self
    }

    /// Run `main` to completion
    ///
    /// # Returns
    ///
    /// * `Ok(())` - When `main` returns
    /// * `Err(VmError)` - On any fatal error, annotated with the
    ///   interpreted call chain
    pub fn execute(&mut self) -> VmResult<()> {
        if self.program.block(self.entry).is_empty() {
            log::debug!("entry block is empty, nothing to run");
            return Ok(());
        }
        let entry_slots = self.program.block(self.entry).memory_slots();
        self.state.reset(entry_slots)?;
        self.current = self.entry;
        let result = self.run().map_err(|error| {
            let chain = self.call_chain();
            error.with_stack(chain)
        });
        let flushed = self.runtime.flush();
        result.and(flushed)
    }

    /// Compile `block` at `tier` outside of the hotness policy
    ///
    /// Does nothing when the block is already at `tier` or higher.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of blocks installed
    /// * `Err(VmError)` - If no JIT is attached or compilation fails
    pub fn compile_block(&mut self, block: BlockId, tier: JitTier) -> VmResult<usize> {
        if self.program.block(block).tier() >= tier {
            return Ok(0);
        }
        let jit = self
            .jit
            .as_deref_mut()
            .ok_or_else(|| VmError::compile("no JIT backend attached"))?;
        let installed = jit.compile(&mut self.program, block, tier)?;
        self.record_installs(tier, installed);
        Ok(installed)
    }

    pub(crate) fn record_installs(&mut self, tier: JitTier, count: usize) {
        match tier {
            JitTier::Optimizing => self.stats.optimizing_compiles += count as u64,
            _ => self.stats.baseline_compiles += count as u64,
        }
    }

    /// Call a compiled routine with its window starting at memory word `mp`
    pub(crate) fn invoke(&mut self, entry: NativeFn, mp: usize) -> VmResult<i64> {
        let runtime = &mut *self.runtime as *mut Runtime as *mut c_void;
        let mut ctx = self.state.native_context(mp, runtime);
        // SAFETY: the context points at the machine's stack, memory and
        // runtime, none of which is borrowed while native code runs; the
        // generated code checks its window and stack bounds on entry.
        let result = unsafe { entry(&mut ctx) };
        self.state.sync_stack(ctx.sp)?;
        Ok(result)
    }

    fn call_chain(&self) -> Vec<String> {
        let mut chain: Vec<String> = self
            .state
            .frames()
            .iter()
            .map(|frame| self.program.block(frame.return_block).name().to_string())
            .collect();
        chain.push(self.program.block(self.current).name().to_string());
        chain
    }

    /// The program, with its current JIT state
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Resolve a block by signature name
    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.program.block_id(name)
    }

    /// Promotion counters
    pub fn stats(&self) -> PromotionStats {
        self.stats
    }

    /// Collector counters
    pub fn gc_stats(&self) -> GcStats {
        self.runtime.memory().stats()
    }

    /// The tracked heap
    pub fn memory_manager(&self) -> &Memory {
        self.runtime.memory()
    }

    /// Operand stack contents, bottom first
    pub fn stack(&self) -> &[i64] {
        self.state.stack()
    }

    /// The flat memory array
    pub fn memory(&self) -> &[i64] {
        self.state.memory()
    }

    /// Active configuration
    pub fn config(&self) -> &VmConfig {
        &self.config
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("jit", &self.jit.is_some())
            .finish()
    }
}
