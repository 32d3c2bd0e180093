//! Bytecode opcodes for the norn stack machine
//!
//! Binary operators take their left operand from the top of the operand
//! stack and their right operand from the slot beneath it. Relational
//! operators push `1` or `0`.

use std::fmt;

/// Index of a block inside its [`Program`](crate::Program)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bytecode opcodes
///
/// Jump opcodes carry a label id until the program is frozen and an
/// absolute instruction index afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    // Literals
    /// Push an integer literal
    LitInt(i64),
    /// Push a float literal
    LitFloat(f64),
    /// Push a character literal
    LitChar(u8),

    // Locals
    /// Push integer local slot
    LoadInt(usize),
    /// Push float local slot
    LoadFloat(usize),
    /// Push character local slot
    LoadChar(usize),
    /// Pop into integer local slot
    StoreInt(usize),
    /// Pop into float local slot
    StoreFloat(usize),
    /// Pop into character local slot
    StoreChar(usize),

    // Integer arithmetic
    /// left + right
    AddInt,
    /// left - right
    SubInt,
    /// left * right
    MulInt,
    /// left / right, truncating
    DivInt,
    /// left % right
    ModInt,
    /// Bitwise and
    AndInt,
    /// Bitwise or
    OrInt,

    // Float arithmetic
    /// left + right
    AddFloat,
    /// left - right
    SubFloat,
    /// left * right
    MulFloat,
    /// left / right
    DivFloat,
    /// fmod(left, right)
    ModFloat,

    // Integer comparison
    /// left < right
    LeInt,
    /// left <= right
    LeqInt,
    /// left > right
    GeInt,
    /// left >= right
    GeqInt,
    /// left == right
    EqInt,
    /// left != right
    NeqInt,

    // Float comparison
    /// left < right
    LeFloat,
    /// left <= right
    LeqFloat,
    /// left > right
    GeFloat,
    /// left >= right
    GeqFloat,
    /// left == right
    EqFloat,
    /// left != right
    NeqFloat,

    // Booleans
    /// Both operands non-zero
    LogicalAnd,
    /// Either operand non-zero
    LogicalOr,

    // Control flow
    /// Pop; jump when non-zero
    Tjmp(usize),
    /// Pop; jump when zero
    Fjmp(usize),
    /// Unconditional jump
    Ujmp(usize),
    /// Jump label marker, removed when the program is frozen
    Lbl(usize),

    // Printing
    /// Pop and print as integer
    PrintInt,
    /// Pop and print as float
    PrintFloat,
    /// Pop and print as character
    PrintChar,

    // Arrays
    /// Allocate an array of the given length and push its handle
    NewAry(usize),
    /// Pop an array handle into a local slot
    StoreAry(usize),
    /// Push the array handle in a local slot
    LoadAry(usize),
    /// Pop index, pop value, store into the array held in a slot
    StoreAryElmInt(usize),
    /// Character variant of [`Opcode::StoreAryElmInt`]
    StoreAryElmChar(usize),
    /// Float variant of [`Opcode::StoreAryElmInt`]
    StoreAryElmFloat(usize),
    /// Pop index, push element of the array held in a slot
    LoadAryElmInt(usize),
    /// Character variant of [`Opcode::LoadAryElmInt`]
    LoadAryElmChar(usize),
    /// Float variant of [`Opcode::LoadAryElmInt`]
    LoadAryElmFloat(usize),
    /// Pop array, copy a pooled string into it, push it back
    CpyAryChar(usize),
    /// Pop array and print its characters
    PrintAryChar,

    // Structs
    /// Pop a byte size and push a new tracked allocation
    Malloc,
    /// Pop handle, pop value, store integer field at byte offset
    StructStoreInt(usize),
    /// Pop handle, pop value, store float field at byte offset
    StructStoreFloat(usize),
    /// Pop handle, pop value, store character field at byte offset
    StructStoreChar(usize),
    /// Pop handle, push integer field at byte offset
    StructLoadInt(usize),
    /// Pop handle, push float field at byte offset
    StructLoadFloat(usize),
    /// Pop handle, push character field at byte offset
    StructLoadChar(usize),

    // Conversion
    /// Float to integer, truncating
    F2I,
    /// Integer to float
    I2F,

    // Calls
    /// Interpreted call
    Call(BlockId),
    /// Call through the callee's native entry
    CallNative(BlockId),
    /// Return to the caller
    Rtrn,

    // Fused macro-opcodes
    /// Push slot + literal
    LitLoadAdd(usize, i64),
    /// Push slot - literal
    LitLoadSub(usize, i64),
    /// Push slot < literal
    LitLoadLe(usize, i64),
}

impl Opcode {
    /// Assembly mnemonic of this opcode
    pub fn mnemonic(&self) -> &'static str {
        use Opcode::*;
        match self {
            LitInt(_) => "LIT_INT",
            LitFloat(_) => "LIT_FLOAT",
            LitChar(_) => "LIT_CHAR",
            LoadInt(_) => "LOAD_INT",
            LoadFloat(_) => "LOAD_FLOAT",
            LoadChar(_) => "LOAD_CHAR",
            StoreInt(_) => "STORE_INT",
            StoreFloat(_) => "STORE_FLOAT",
            StoreChar(_) => "STORE_CHAR",
            AddInt => "ADD_INT",
            SubInt => "SUB_INT",
            MulInt => "MUL_INT",
            DivInt => "DIV_INT",
            ModInt => "MOD_INT",
            AndInt => "AND_INT",
            OrInt => "OR_INT",
            AddFloat => "ADD_FLOAT",
            SubFloat => "SUB_FLOAT",
            MulFloat => "MUL_FLOAT",
            DivFloat => "DIV_FLOAT",
            ModFloat => "MOD_FLOAT",
            LeInt => "LE_INT",
            LeqInt => "LEQ_INT",
            GeInt => "GE_INT",
            GeqInt => "GEQ_INT",
            EqInt => "EQ_INT",
            NeqInt => "NEQ_INT",
            LeFloat => "LE_FLOAT",
            LeqFloat => "LEQ_FLOAT",
            GeFloat => "GE_FLOAT",
            GeqFloat => "GEQ_FLOAT",
            EqFloat => "EQ_FLOAT",
            NeqFloat => "NEQ_FLOAT",
            LogicalAnd => "LOGICAL_AND",
            LogicalOr => "LOGICAL_OR",
            Tjmp(_) => "TJMP",
            Fjmp(_) => "FJMP",
            Ujmp(_) => "UJMP",
            Lbl(_) => "LBL",
            PrintInt => "PRINT_INT",
            PrintFloat => "PRINT_FLOAT",
            PrintChar => "PRINT_CHAR",
            NewAry(_) => "NEW_ARY",
            StoreAry(_) => "STORE_ARY",
            LoadAry(_) => "LOAD_ARY",
            StoreAryElmInt(_) => "STORE_ARY_ELM_INT",
            StoreAryElmChar(_) => "STORE_ARY_ELM_CHAR",
            StoreAryElmFloat(_) => "STORE_ARY_ELM_FLOAT",
            LoadAryElmInt(_) => "LOAD_ARY_ELM_INT",
            LoadAryElmChar(_) => "LOAD_ARY_ELM_CHAR",
            LoadAryElmFloat(_) => "LOAD_ARY_ELM_FLOAT",
            CpyAryChar(_) => "CPY_ARY_CHAR",
            PrintAryChar => "PRINT_ARY_CHAR",
            Malloc => "MALLOC",
            StructStoreInt(_) => "STRUCT_STORE_INT",
            StructStoreFloat(_) => "STRUCT_STORE_FLOAT",
            StructStoreChar(_) => "STRUCT_STORE_CHAR",
            StructLoadInt(_) => "STRUCT_LOAD_INT",
            StructLoadFloat(_) => "STRUCT_LOAD_FLOAT",
            StructLoadChar(_) => "STRUCT_LOAD_CHAR",
            F2I => "F2I",
            I2F => "I2F",
            Call(_) => "CALL",
            CallNative(_) => "CALL_NATIVE",
            Rtrn => "RTRN",
            LitLoadAdd(..) => "LIT_LOAD_ADD",
            LitLoadSub(..) => "LIT_LOAD_SUB",
            LitLoadLe(..) => "LIT_LOAD_LE",
        }
    }

    /// Local slot written by this opcode, if any
    ///
    /// Only stores size a block's memory window.
    pub fn stored_slot(&self) -> Option<usize> {
        match *self {
            Opcode::StoreInt(slot)
            | Opcode::StoreFloat(slot)
            | Opcode::StoreChar(slot)
            | Opcode::StoreAry(slot) => Some(slot),
            _ => None,
        }
    }

    /// Local slot read or written by this opcode, if any
    pub fn local_slot(&self) -> Option<usize> {
        use Opcode::*;
        match *self {
            LoadInt(s) | LoadFloat(s) | LoadChar(s) | StoreInt(s) | StoreFloat(s)
            | StoreChar(s) | StoreAry(s) | LoadAry(s) | StoreAryElmInt(s)
            | StoreAryElmChar(s) | StoreAryElmFloat(s) | LoadAryElmInt(s)
            | LoadAryElmChar(s) | LoadAryElmFloat(s) => Some(s),
            LitLoadAdd(s, _) | LitLoadSub(s, _) | LitLoadLe(s, _) => Some(s),
            _ => None,
        }
    }

    /// Jump target (label id or instruction index), if this is a jump
    pub fn jump_target(&self) -> Option<usize> {
        match *self {
            Opcode::Tjmp(t) | Opcode::Fjmp(t) | Opcode::Ujmp(t) => Some(t),
            _ => None,
        }
    }

    /// Same jump opcode with a different target
    pub fn with_jump_target(self, target: usize) -> Self {
        match self {
            Opcode::Tjmp(_) => Opcode::Tjmp(target),
            Opcode::Fjmp(_) => Opcode::Fjmp(target),
            Opcode::Ujmp(_) => Opcode::Ujmp(target),
            other => other,
        }
    }

    /// Callee of a call opcode
    pub fn callee(&self) -> Option<BlockId> {
        match *self {
            Opcode::Call(id) | Opcode::CallNative(id) => Some(id),
            _ => None,
        }
    }

    /// Whether this opcode allocates or dereferences heap memory
    pub fn touches_heap(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            NewAry(_)
                | StoreAry(_)
                | LoadAry(_)
                | StoreAryElmInt(_)
                | StoreAryElmChar(_)
                | StoreAryElmFloat(_)
                | LoadAryElmInt(_)
                | LoadAryElmChar(_)
                | LoadAryElmFloat(_)
                | CpyAryChar(_)
                | PrintAryChar
                | Malloc
                | StructStoreInt(_)
                | StructStoreFloat(_)
                | StructStoreChar(_)
                | StructLoadInt(_)
                | StructLoadFloat(_)
                | StructLoadChar(_)
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Opcode::*;
        let name = self.mnemonic();
        match *self {
            LitInt(v) => write!(f, "{} {}", name, v),
            LitFloat(v) => write!(f, "{} {:?}", name, v),
            LitChar(c) => write!(f, "{} {:?}", name, c as char),
            LitLoadAdd(s, v) | LitLoadSub(s, v) | LitLoadLe(s, v) => {
                write!(f, "{} {} {}", name, s, v)
            }
            Call(id) | CallNative(id) => write!(f, "{} {}", name, id),
            LoadInt(a) | LoadFloat(a) | LoadChar(a) | StoreInt(a) | StoreFloat(a)
            | StoreChar(a) | Tjmp(a) | Fjmp(a) | Ujmp(a) | Lbl(a) | NewAry(a)
            | StoreAry(a) | LoadAry(a) | StoreAryElmInt(a) | StoreAryElmChar(a)
            | StoreAryElmFloat(a) | LoadAryElmInt(a) | LoadAryElmChar(a)
            | LoadAryElmFloat(a) | CpyAryChar(a) | StructStoreInt(a)
            | StructStoreFloat(a) | StructStoreChar(a) | StructLoadInt(a)
            | StructLoadFloat(a) | StructLoadChar(a) => write!(f, "{} {}", name, a),
            _ => f.write_str(name),
        }
    }
}
