//! Engine error types and fatal reporting.
//!
//! Every engine error is fatal: it travels up as a [`VmError`] until the
//! embedder reports it, or, inside runtime helpers called from compiled
//! code where unwinding is impossible, it is reported on the spot by
//! [`fatal`].

use std::backtrace::Backtrace;
use std::fmt;

/// The category of an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Code generation failed (unsupported opcode, tier precondition)
    Compile,
    /// Invalid program state reached during execution
    Runtime,
    /// Integer division or modulo by zero, or overflow
    Arithmetic,
    /// A stack, frame, window or array bound was exceeded
    Bounds,
    /// Heap bookkeeping violation (duplicate address, unknown handle)
    Memory,
    /// Malformed bytecode listing
    Assembly,
    /// Internal engine error
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Compile => "compile error",
            ErrorKind::Runtime => "runtime error",
            ErrorKind::Arithmetic => "arithmetic error",
            ErrorKind::Bounds => "bounds error",
            ErrorKind::Memory => "memory error",
            ErrorKind::Assembly => "assembly error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// An engine error with message and interpreted call chain.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, VmError};
///
/// let error = VmError::new(ErrorKind::Bounds, "operand stack overflow")
///     .with_stack(vec!["main".to_string(), "fact(int)".to_string()]);
///
/// assert_eq!(error.to_string(), "bounds error: operand stack overflow");
/// assert_eq!(error.stack.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmError {
    /// The category of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Block names of the interpreted call chain, outermost first
    pub stack: Vec<String>,
}

/// Result alias used throughout the engine.
pub type VmResult<T> = Result<T, VmError>;

impl VmError {
    /// Create an error without call chain information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Attach the interpreted call chain.
    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = stack;
        self
    }

    /// Shorthand for a [`ErrorKind::Compile`] error.
    pub fn compile(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile, message)
    }

    /// Shorthand for a [`ErrorKind::Runtime`] error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Shorthand for a [`ErrorKind::Bounds`] error.
    pub fn bounds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Bounds, message)
    }

    /// Shorthand for a [`ErrorKind::Memory`] error.
    pub fn memory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Memory, message)
    }

    /// Write the message, call chain and a best-effort backtrace to stderr.
    pub fn report(&self) {
        eprintln!("{}", self);
        for (depth, name) in self.stack.iter().rev().enumerate() {
            eprintln!("  #{} {}", depth, name);
        }
        let backtrace = Backtrace::capture();
        eprintln!("{}", backtrace);
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for VmError {}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        VmError::new(ErrorKind::Internal, format!("output failed: {}", err))
    }
}

/// Report `error` and terminate the process with exit status 1.
///
/// Used where the error cannot be propagated, such as runtime helpers
/// invoked from compiled code.
pub fn fatal(error: &VmError) -> ! {
    error.report();
    std::process::exit(1)
}
