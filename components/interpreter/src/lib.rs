//! Bytecode interpreter for the norn virtual machine
//!
//! This crate provides the execution core:
//! - A stack machine with per-activation memory windows
//! - Hotness counters that promote blocks to compiled tiers
//! - The runtime services (printing, heap access) shared with native code
//!
//! Code generation itself lives behind [`JitBackend`].
//!
//! # Example
//!
//! ```
//! use bytecode_system::assemble;
//! use interpreter::{Machine, SharedOutput, VmConfig};
//!
//! let program = assemble(
//!     ".block main\n LIT_INT 3\n STORE_INT 0\n LOAD_INT 0\n PRINT_INT\n RTRN\n",
//! )
//! .unwrap();
//! let output = SharedOutput::new();
//! let mut machine = Machine::new(program, VmConfig::default().with_jit(false))
//!     .unwrap()
//!     .with_output(output.clone());
//!
//! machine.execute().unwrap();
//! assert_eq!(output.contents(), "3");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod config;
mod dispatch;
pub mod native;
pub mod output;
pub mod runtime;
pub mod state;
pub mod tier;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::{Frame, MemoryWindow};
pub use config::{VmConfig, BACKEDGE_HOTNESS, CALL_HOTNESS, OPTIMIZE_HOTNESS, STACK_SIZE};
pub use native::{width_code, AbiType, GuardFailure, RuntimeHelper};
pub use output::SharedOutput;
pub use runtime::Runtime;
pub use state::VmState;
pub use tier::{EntryRoutine, JitBackend, PromotionStats};
pub use vm::Machine;
