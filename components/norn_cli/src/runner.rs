//! Loading and running listings
//!
//! The runner assembles a listing, builds a machine with or without the
//! JIT tiers, and reports what the machine promoted and collected.

use std::io::Write;
use std::path::Path;

use bytecode_system::{assemble, Program};
use interpreter::{Machine, PromotionStats, VmConfig};
use jit_compiler::Jit;
use memory_manager::GcStats;
use serde::Serialize;

use crate::error::{CliError, CliResult};

/// What a finished run promoted and collected
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunReport {
    /// Tier promotions
    pub promotion: PromotionStats,
    /// Collector activity
    pub gc: GcStats,
}

impl RunReport {
    /// Encode as a single JSON line
    pub fn to_json(&self) -> CliResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Runs listings with a fixed configuration
#[derive(Debug, Clone)]
pub struct Runner {
    config: VmConfig,
}

impl Runner {
    /// Create a runner
    ///
    /// # Example
    ///
    /// ```
    /// use interpreter::{SharedOutput, VmConfig};
    /// use norn_cli::Runner;
    ///
    /// let runner = Runner::new(VmConfig::default().with_jit(false));
    /// let output = SharedOutput::new();
    /// runner
    ///     .run_source(".block main\n LIT_INT 5\n PRINT_INT\n RTRN\n", output.clone())
    ///     .unwrap();
    /// assert_eq!(output.contents(), "5");
    /// ```
    pub fn new(config: VmConfig) -> Self {
        Self { config }
    }

    /// Read and assemble a listing
    pub fn load(&self, path: &Path) -> CliResult<Program> {
        let source = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(assemble(&source)?)
    }

    /// Run a listing, printing to stdout
    pub fn run_file(&self, path: &Path) -> CliResult<RunReport> {
        let program = self.load(path)?;
        self.run(program, std::io::stdout())
    }

    /// Assemble and run `source`, printing to `out`
    pub fn run_source(&self, source: &str, out: impl Write + 'static) -> CliResult<RunReport> {
        let program = assemble(source)?;
        self.run(program, out)
    }

    /// Run an assembled program, printing to `out`
    pub fn run(&self, program: Program, out: impl Write + 'static) -> CliResult<RunReport> {
        let mut machine = Machine::new(program, self.config.clone())?.with_output(out);
        if self.config.jit_enabled {
            machine = machine.with_jit(Box::new(Jit::new()?));
        }
        log::debug!("running with {:?}", self.config);
        machine.execute()?;

        Ok(RunReport {
            promotion: machine.stats(),
            gc: machine.gc_stats(),
        })
    }
}
