//! Opcode-directed value representation.
//!
//! The operand stack and the flat memory array hold raw 64-bit words. The
//! meaning of a word is decided by the opcode that touches it, never by a
//! run-time tag. [`Variant`] is the typed view used whenever a word leaves
//! the hot path: instruction literals, disassembly, and inspection.

use std::fmt;

/// A raw machine word as stored on the operand stack and in memory.
pub type Word = i64;

/// The static interpretation an opcode applies to a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Signed 64-bit integer
    Int,
    /// IEEE-754 double stored as its bit pattern
    Float,
    /// Single byte, zero-extended
    Char,
    /// Handle to a tracked heap allocation
    Ptr,
}

/// A word together with the interpretation an opcode gives it.
///
/// # Examples
///
/// ```
/// use core_types::{ValueKind, Variant};
///
/// let v = Variant::Char(b'h');
/// assert_eq!(v.to_word(), 104);
/// assert_eq!(v.kind(), ValueKind::Char);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variant {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Character value
    Char(u8),
    /// Heap handle
    Ptr(usize),
}

impl Variant {
    /// Encode into the raw word representation.
    pub fn to_word(self) -> Word {
        match self {
            Variant::Int(i) => i,
            Variant::Float(f) => f.to_bits() as i64,
            Variant::Char(c) => c as i64,
            Variant::Ptr(p) => p as i64,
        }
    }

    /// Decode a raw word under the interpretation `kind`.
    ///
    /// # Arguments
    ///
    /// * `word` - Raw stack or memory word
    /// * `kind` - Interpretation dictated by the opcode reading the word
    pub fn from_word(word: Word, kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Variant::Int(word),
            ValueKind::Float => Variant::Float(f64::from_bits(word as u64)),
            ValueKind::Char => Variant::Char(word as u8),
            ValueKind::Ptr => Variant::Ptr(word as usize),
        }
    }

    /// The interpretation this variant carries.
    pub fn kind(&self) -> ValueKind {
        match self {
            Variant::Int(_) => ValueKind::Int,
            Variant::Float(_) => ValueKind::Float,
            Variant::Char(_) => ValueKind::Char,
            Variant::Ptr(_) => ValueKind::Ptr,
        }
    }

    /// Integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Character payload, if this is a character.
    pub fn as_char(&self) -> Option<u8> {
        match self {
            Variant::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Heap handle, if this is a pointer.
    pub fn as_ptr(&self) -> Option<usize> {
        match self {
            Variant::Ptr(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Float(x) => write!(f, "{}", crate::format_g(*x)),
            Variant::Char(c) => write!(f, "{:?}", *c as char),
            Variant::Ptr(p) => write!(f, "{:#x}", p),
        }
    }
}
