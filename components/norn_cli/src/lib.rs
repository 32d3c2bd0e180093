//! Command-line front end for the norn virtual machine
//!
//! Loads an assembly listing, optionally prints its disassembly, and runs
//! it with the tiers selected on the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod runner;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runner::{RunReport, Runner};
