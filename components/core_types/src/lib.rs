//! Core value types, errors and the native calling ABI of the norn engine.
//!
//! This crate provides the foundational types shared by every other
//! component: the opcode-directed value model, the error type used for
//! fatal engine errors, float formatting used by the print builtins, and
//! the `#[repr(C)]` context block that compiled code receives.
//!
//! # Overview
//!
//! - [`Variant`] - Tagged view of a raw stack or memory word
//! - [`VmError`] - Engine error with kind, message and call chain
//! - [`ErrorKind`] - Category of an engine error
//! - [`NativeContext`] - Cursor block shared with compiled code
//! - [`format_g`] - `%g` style float rendering
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, ValueKind, Variant, VmError};
//!
//! let word = Variant::Float(2.5).to_word();
//! assert_eq!(Variant::from_word(word, ValueKind::Float), Variant::Float(2.5));
//!
//! let error = VmError::new(ErrorKind::Runtime, "label reached at runtime");
//! assert_eq!(error.kind, ErrorKind::Runtime);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod abi;
mod error;
mod format;
mod value;

pub use abi::{NativeContext, NativeFn};
pub use error::{fatal, ErrorKind, VmError, VmResult};
pub use format::format_g;
pub use value::{ValueKind, Variant, Word};
