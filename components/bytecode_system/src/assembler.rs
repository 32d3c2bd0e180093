//! Text assembler for bytecode listings
//!
//! A listing is a sequence of lines:
//!
//! ```text
//! ; comment
//! .string "hi"          ; pooled string, indexed in order of appearance
//! .block main           ; following instructions belong to `main`
//!     LIT_INT 5
//!     CALL fact(int)    ; blocks may be referenced before they are declared
//! loop:                 ; label, referenced by TJMP/FJMP/UJMP
//!     UJMP loop
//! ```
//!
//! Character literals are written `'h'` or as a byte value. `CPY_ARY_CHAR`
//! accepts a pool index or a quoted string, which is interned on the fly.

use std::collections::HashMap;

use core_types::{ErrorKind, VmError, VmResult};

use crate::instruction::Instruction;
use crate::opcode::{BlockId, Opcode};
use crate::program::{Program, ProgramBuilder};

struct PendingBlock {
    id: BlockId,
    lines: Vec<(u32, String)>,
}

/// Assemble and freeze a listing
///
/// # Arguments
///
/// * `source` - Listing text
///
/// # Returns
///
/// * `Ok(Program)` - The frozen program
/// * `Err(VmError)` - On malformed input, with the offending line number
///
/// # Example
///
/// ```
/// use bytecode_system::{assemble, Opcode};
///
/// let program = assemble(".block main\n LIT_INT 1\n PRINT_INT\n RTRN\n").unwrap();
/// let main = program.block(program.main().unwrap());
/// assert_eq!(main.instructions()[0].opcode, Opcode::LitInt(1));
/// ```
pub fn assemble(source: &str) -> VmResult<Program> {
    let mut builder = ProgramBuilder::new();
    let mut pending: Vec<PendingBlock> = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(".block") {
            let name = rest.trim();
            if name.is_empty() {
                return Err(error(line_no, "missing block name"));
            }
            let id = builder
                .add_block(name)
                .map_err(|e| error(line_no, &e.message))?;
            pending.push(PendingBlock {
                id,
                lines: Vec::new(),
            });
        } else if let Some(rest) = line.strip_prefix(".string") {
            let text = parse_string(rest.trim(), line_no)?;
            builder.add_string(&text);
        } else {
            let block = pending
                .last_mut()
                .ok_or_else(|| error(line_no, "instruction outside of a .block"))?;
            block.lines.push((line_no, line.to_string()));
        }
    }

    for block in pending {
        let mut labels: HashMap<String, usize> = HashMap::new();
        for (line_no, line) in block.lines {
            let opcode = match line.strip_suffix(':') {
                Some(label) if !label.contains(char::is_whitespace) => {
                    Opcode::Lbl(label_id(&mut labels, label))
                }
                _ => parse_instruction(&line, line_no, &mut builder, &mut labels)?,
            };
            builder.emit(block.id, Instruction::with_line(opcode, line_no));
        }
    }

    builder.finish()
}

fn parse_instruction(
    line: &str,
    line_no: u32,
    builder: &mut ProgramBuilder,
    labels: &mut HashMap<String, usize>,
) -> VmResult<Opcode> {
    let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
        Some((m, r)) => (m, r.trim()),
        None => (line, ""),
    };
    let mut args = rest.split_whitespace();
    let mut next = || {
        args.next()
            .ok_or_else(|| error(line_no, &format!("{} expects an operand", mnemonic)))
    };

    let opcode = match mnemonic {
        "LIT_INT" => Opcode::LitInt(parse_num(next()?, line_no)?),
        "LIT_FLOAT" => Opcode::LitFloat(parse_num(next()?, line_no)?),
        "LIT_CHAR" => Opcode::LitChar(parse_char(rest, line_no)?),
        "LOAD_INT" => Opcode::LoadInt(parse_num(next()?, line_no)?),
        "LOAD_FLOAT" => Opcode::LoadFloat(parse_num(next()?, line_no)?),
        "LOAD_CHAR" => Opcode::LoadChar(parse_num(next()?, line_no)?),
        "STORE_INT" => Opcode::StoreInt(parse_num(next()?, line_no)?),
        "STORE_FLOAT" => Opcode::StoreFloat(parse_num(next()?, line_no)?),
        "STORE_CHAR" => Opcode::StoreChar(parse_num(next()?, line_no)?),
        "ADD_INT" => Opcode::AddInt,
        "SUB_INT" => Opcode::SubInt,
        "MUL_INT" => Opcode::MulInt,
        "DIV_INT" => Opcode::DivInt,
        "MOD_INT" => Opcode::ModInt,
        "AND_INT" => Opcode::AndInt,
        "OR_INT" => Opcode::OrInt,
        "ADD_FLOAT" => Opcode::AddFloat,
        "SUB_FLOAT" => Opcode::SubFloat,
        "MUL_FLOAT" => Opcode::MulFloat,
        "DIV_FLOAT" => Opcode::DivFloat,
        "MOD_FLOAT" => Opcode::ModFloat,
        "LE_INT" => Opcode::LeInt,
        "LEQ_INT" => Opcode::LeqInt,
        "GE_INT" => Opcode::GeInt,
        "GEQ_INT" => Opcode::GeqInt,
        "EQ_INT" => Opcode::EqInt,
        "NEQ_INT" => Opcode::NeqInt,
        "LE_FLOAT" => Opcode::LeFloat,
        "LEQ_FLOAT" => Opcode::LeqFloat,
        "GE_FLOAT" => Opcode::GeFloat,
        "GEQ_FLOAT" => Opcode::GeqFloat,
        "EQ_FLOAT" => Opcode::EqFloat,
        "NEQ_FLOAT" => Opcode::NeqFloat,
        "LOGICAL_AND" => Opcode::LogicalAnd,
        "LOGICAL_OR" => Opcode::LogicalOr,
        "TJMP" => Opcode::Tjmp(label_id(labels, next()?)),
        "FJMP" => Opcode::Fjmp(label_id(labels, next()?)),
        "UJMP" => Opcode::Ujmp(label_id(labels, next()?)),
        "PRINT_INT" => Opcode::PrintInt,
        "PRINT_FLOAT" => Opcode::PrintFloat,
        "PRINT_CHAR" => Opcode::PrintChar,
        "NEW_ARY" => Opcode::NewAry(parse_num(next()?, line_no)?),
        "STORE_ARY" => Opcode::StoreAry(parse_num(next()?, line_no)?),
        "LOAD_ARY" => Opcode::LoadAry(parse_num(next()?, line_no)?),
        "STORE_ARY_ELM_INT" => Opcode::StoreAryElmInt(parse_num(next()?, line_no)?),
        "STORE_ARY_ELM_CHAR" => Opcode::StoreAryElmChar(parse_num(next()?, line_no)?),
        "STORE_ARY_ELM_FLOAT" => Opcode::StoreAryElmFloat(parse_num(next()?, line_no)?),
        "LOAD_ARY_ELM_INT" => Opcode::LoadAryElmInt(parse_num(next()?, line_no)?),
        "LOAD_ARY_ELM_CHAR" => Opcode::LoadAryElmChar(parse_num(next()?, line_no)?),
        "LOAD_ARY_ELM_FLOAT" => Opcode::LoadAryElmFloat(parse_num(next()?, line_no)?),
        "CPY_ARY_CHAR" => {
            if rest.starts_with('"') {
                let text = parse_string(rest, line_no)?;
                Opcode::CpyAryChar(builder.add_string(&text))
            } else {
                Opcode::CpyAryChar(parse_num(next()?, line_no)?)
            }
        }
        "PRINT_ARY_CHAR" => Opcode::PrintAryChar,
        "MALLOC" => Opcode::Malloc,
        "STRUCT_STORE_INT" => Opcode::StructStoreInt(parse_num(next()?, line_no)?),
        "STRUCT_STORE_FLOAT" => Opcode::StructStoreFloat(parse_num(next()?, line_no)?),
        "STRUCT_STORE_CHAR" => Opcode::StructStoreChar(parse_num(next()?, line_no)?),
        "STRUCT_LOAD_INT" => Opcode::StructLoadInt(parse_num(next()?, line_no)?),
        "STRUCT_LOAD_FLOAT" => Opcode::StructLoadFloat(parse_num(next()?, line_no)?),
        "STRUCT_LOAD_CHAR" => Opcode::StructLoadChar(parse_num(next()?, line_no)?),
        "F2I" => Opcode::F2I,
        "I2F" => Opcode::I2F,
        "CALL" | "CALL_NATIVE" => {
            let id = builder
                .block_id(rest)
                .ok_or_else(|| error(line_no, &format!("unknown block '{}'", rest)))?;
            if mnemonic == "CALL" {
                Opcode::Call(id)
            } else {
                Opcode::CallNative(id)
            }
        }
        "RTRN" => Opcode::Rtrn,
        "LIT_LOAD_ADD" => Opcode::LitLoadAdd(parse_num(next()?, line_no)?, parse_num(next()?, line_no)?),
        "LIT_LOAD_SUB" => Opcode::LitLoadSub(parse_num(next()?, line_no)?, parse_num(next()?, line_no)?),
        "LIT_LOAD_LE" => Opcode::LitLoadLe(parse_num(next()?, line_no)?, parse_num(next()?, line_no)?),
        "LBL" => Opcode::Lbl(label_id(labels, next()?)),
        other => return Err(error(line_no, &format!("unknown mnemonic '{}'", other))),
    };
    Ok(opcode)
}

fn label_id(labels: &mut HashMap<String, usize>, name: &str) -> usize {
    let next = labels.len();
    *labels.entry(name.to_string()).or_insert(next)
}

fn parse_num<T: std::str::FromStr>(token: &str, line_no: u32) -> VmResult<T> {
    token
        .parse()
        .map_err(|_| error(line_no, &format!("invalid operand '{}'", token)))
}

fn parse_char(token: &str, line_no: u32) -> VmResult<u8> {
    if let Some(inner) = token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let bytes = unescape(inner, line_no)?;
        if bytes.len() == 1 {
            return Ok(bytes[0]);
        }
        return Err(error(line_no, &format!("invalid character literal {}", token)));
    }
    parse_num(token, line_no)
}

fn parse_string(token: &str, line_no: u32) -> VmResult<String> {
    let inner = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| error(line_no, "expected a quoted string"))?;
    let bytes = unescape(inner, line_no)?;
    String::from_utf8(bytes).map_err(|_| error(line_no, "string is not valid UTF-8"))
}

fn unescape(text: &str, line_no: u32) -> VmResult<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let escaped = match bytes.next() {
            Some(b'n') => b'\n',
            Some(b't') => b'\t',
            Some(b'0') => 0,
            Some(b'\\') => b'\\',
            Some(b'\'') => b'\'',
            Some(b'"') => b'"',
            _ => return Err(error(line_no, "invalid escape sequence")),
        };
        out.push(escaped);
    }
    Ok(out)
}

/// Drop a `;` comment, ignoring semicolons inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', Some(_)) => escaped = true,
            ('"' | '\'', None) => quote = Some(c),
            (q, Some(open)) if q == open => quote = None,
            (';', None) => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn error(line_no: u32, message: &str) -> VmError {
    VmError::new(ErrorKind::Assembly, format!("line {}: {}", line_no, message))
}
