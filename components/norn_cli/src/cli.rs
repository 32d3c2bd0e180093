//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;
use interpreter::{VmConfig, BACKEDGE_HOTNESS, CALL_HOTNESS, OPTIMIZE_HOTNESS, STACK_SIZE};
use memory_manager::GC_THRESHOLD;

/// Run a norn assembly listing
#[derive(Debug, Parser)]
#[command(name = "norn", version, about)]
pub struct Cli {
    /// Assembly listing to run
    pub file: PathBuf,

    /// Interpret only; never compile
    #[arg(long)]
    pub nojit: bool,

    /// Disable the optimizing tier
    #[arg(long)]
    pub noopt: bool,

    /// Log promotions and collections at debug level
    #[arg(long)]
    pub debug: bool,

    /// Print the disassembled program instead of running it
    #[arg(long)]
    pub bytecode: bool,

    /// Print promotion and collector statistics as JSON on stderr
    #[arg(long)]
    pub stats: bool,

    /// Interpreted calls before a block is compiled
    #[arg(long, default_value_t = CALL_HOTNESS)]
    pub call_hotness: u32,

    /// Backward jumps before a loop is compiled
    #[arg(long, default_value_t = BACKEDGE_HOTNESS)]
    pub backedge_hotness: u32,

    /// Native calls before a block is optimized
    #[arg(long, default_value_t = OPTIMIZE_HOTNESS)]
    pub optimize_hotness: u32,

    /// Tracked allocations before the first collection
    #[arg(long, default_value_t = GC_THRESHOLD)]
    pub gc_threshold: usize,

    /// Operand stack and call depth capacity
    #[arg(long, default_value_t = STACK_SIZE)]
    pub stack_size: usize,
}

impl Cli {
    /// Machine configuration selected by the flags
    pub fn config(&self) -> VmConfig {
        VmConfig::default()
            .with_jit(!self.nojit)
            .with_optimizer(!self.noopt)
            .with_call_hotness(self.call_hotness)
            .with_backedge_hotness(self.backedge_hotness)
            .with_optimize_hotness(self.optimize_hotness)
            .with_gc_threshold(self.gc_threshold)
            .with_stack_size(self.stack_size)
    }

    /// Default log level when `RUST_LOG` is unset
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        }
    }
}
