//! Memory Manager - tracked heap and conservative garbage collector
//!
//! This component provides:
//! - One-word tracked cells with an in-pointer mark bit
//! - Struct and length-prefixed array allocation under one allocator
//! - Conservative mark-and-sweep driven by caller-published roots
//! - Bounds-checked field and element access shared by every tier

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gc;
pub mod tracked;

// Re-export main types
pub use gc::{FieldWidth, GcStats, Memory, RootSet, GC_THRESHOLD};
pub use tracked::{Allocation, TrackedCell, WORD};
