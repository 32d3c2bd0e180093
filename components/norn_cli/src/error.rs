//! Error types for the CLI

use std::path::PathBuf;

use core_types::VmError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// The listing could not be read
    #[error("could not read '{}': {source}", path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Assembly or execution failed
    #[error(transparent)]
    Vm(#[from] VmError),

    /// Statistics could not be encoded
    #[error("could not encode statistics: {0}")]
    Stats(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
