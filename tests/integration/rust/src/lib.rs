//! Integration test suite for the norn virtual machine
//!
//! Cross-crate tests that run whole listings through the interpreter and
//! both JIT tiers.

use bytecode_system::assemble;
use interpreter::{Machine, SharedOutput, VmConfig};
use jit_compiler::Jit;

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use jit_compiler;
    pub use memory_manager;
    pub use norn_cli;
}

/// Tier a test run is allowed to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tiers {
    /// Interpreter only
    Interpreted,
    /// Interpreter and baseline code
    Baseline,
    /// Every tier, with low thresholds
    Optimizing,
}

impl Tiers {
    /// All tier settings
    pub const ALL: [Tiers; 3] = [Tiers::Interpreted, Tiers::Baseline, Tiers::Optimizing];

    /// Configuration that promotes aggressively up to this tier
    pub fn config(self) -> VmConfig {
        match self {
            Tiers::Interpreted => VmConfig::default().with_jit(false),
            Tiers::Baseline => VmConfig::default()
                .with_call_hotness(1)
                .with_backedge_hotness(3)
                .with_optimizer(false),
            Tiers::Optimizing => VmConfig::default()
                .with_call_hotness(2)
                .with_backedge_hotness(10_000)
                .with_optimize_hotness(4),
        }
    }
}

/// Assemble and run `source`, returning the machine and its output
pub fn run(source: &str, config: VmConfig) -> (Machine, String) {
    let program = assemble(source).expect("listing assembles");
    let output = SharedOutput::new();
    let jit_enabled = config.jit_enabled;
    let mut machine = Machine::new(program, config)
        .expect("program has main")
        .with_output(output.clone());
    if jit_enabled {
        machine = machine.with_jit(Box::new(Jit::new().expect("host is supported")));
    }
    machine.execute().expect("program runs");
    let text = output.contents();
    (machine, text)
}
