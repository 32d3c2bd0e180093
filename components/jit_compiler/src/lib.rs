//! Two-tier JIT compilation for the norn virtual machine
//!
//! This crate provides:
//! - Baseline JIT: per-block translation over the interpreter's own stack
//!   and memory window, including mid-block entry routines for hot loops
//! - Optimizing JIT: register-resident locals and operands for leaf and
//!   self-recursive blocks whose callees are already optimized
//! - [`Jit`], the [`JitBackend`] the machine promotes blocks through
//!
//! Both tiers generate code with Cranelift.
//!
//! # Example
//!
//! ```
//! use bytecode_system::assemble;
//! use interpreter::{Machine, SharedOutput, VmConfig};
//! use jit_compiler::Jit;
//!
//! let program = assemble(".block main\n LIT_INT 6\n LIT_INT 7\n MUL_INT\n PRINT_INT\n RTRN\n").unwrap();
//! let output = SharedOutput::new();
//! let mut machine = Machine::new(program, VmConfig::default())
//!     .unwrap()
//!     .with_output(output.clone())
//!     .with_jit(Box::new(Jit::new().unwrap()));
//!
//! machine.execute().unwrap();
//! assert_eq!(output.contents(), "42");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
mod codegen;
pub mod cranelift_backend;
pub mod optimizing;

use bytecode_system::{BlockId, JitTier, Program};
use core_types::VmResult;
use interpreter::{EntryRoutine, JitBackend};

// Re-export main types at crate root
pub use baseline::{BaselineJIT, BaselineStats};
pub use cranelift_backend::CraneliftBackend;
pub use optimizing::{OptimizingJIT, OptimizingStats};

/// Both compiled tiers behind the machine's backend interface
#[derive(Debug)]
pub struct Jit {
    baseline: BaselineJIT,
    optimizing: OptimizingJIT,
}

impl Jit {
    /// Create both tiers for the host machine
    pub fn new() -> VmResult<Self> {
        Ok(Self {
            baseline: BaselineJIT::new()?,
            optimizing: OptimizingJIT::new()?,
        })
    }

    /// The baseline tier
    pub fn baseline(&self) -> &BaselineJIT {
        &self.baseline
    }

    /// The optimizing tier
    pub fn optimizing(&self) -> &OptimizingJIT {
        &self.optimizing
    }
}

impl JitBackend for Jit {
    fn compile(&mut self, program: &mut Program, block: BlockId, tier: JitTier) -> VmResult<usize> {
        match tier {
            JitTier::None => Ok(0),
            JitTier::Basic => self.baseline.compile(program, block),
            JitTier::Optimizing => self.optimizing.compile(program, block),
        }
    }

    fn compile_entry(
        &mut self,
        program: &mut Program,
        block: BlockId,
        start_ip: usize,
    ) -> VmResult<EntryRoutine> {
        self.baseline.compile_entry(program, block, start_ip)
    }

    fn can_optimize(&self, program: &Program, block: BlockId) -> bool {
        OptimizingJIT::check(program, block).is_ok()
    }
}
