//! Tests for program freezing and disassembly

use bytecode_system::{assemble, Opcode, ProgramBuilder};

#[test]
fn test_every_jump_targets_its_own_block() {
    let source = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 1000
    FJMP done
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    LOAD_INT 0
    PRINT_INT
    RTRN
";
    let program = assemble(source).unwrap();
    for (_, block) in program.blocks() {
        for inst in block.instructions() {
            if let Some(target) = inst.opcode.jump_target() {
                assert!(target < block.len());
            }
        }
    }
    let main = program.block(program.main().unwrap());
    assert_eq!(main.instructions()[3].opcode, Opcode::Fjmp(7));
    assert_eq!(main.instructions()[6].opcode, Opcode::Ujmp(2));
}

#[test]
fn test_total_memory_slots_sums_blocks() {
    let source = "\
.block main
    STORE_INT 1
    RTRN
.block f(int)
    STORE_INT 0
    STORE_ARY 2
    RTRN
";
    let program = assemble(source).unwrap();
    assert_eq!(program.total_memory_slots(), 5);
}

#[test]
fn test_builder_resolves_ids_by_signature() {
    let mut builder = ProgramBuilder::new();
    let a = builder.add_block("max(int,int)").unwrap();
    let b = builder.add_block("max(float,float)").unwrap();
    assert_ne!(a, b);
    assert_eq!(builder.block_id("max(float,float)"), Some(b));
    assert_eq!(builder.block_id("max(char,char)"), None);
}

#[test]
fn test_disassembly_lists_strings_and_blocks() {
    let program = assemble(".block main\n NEW_ARY 2\n CPY_ARY_CHAR \"hi\"\n PRINT_ARY_CHAR\n RTRN\n").unwrap();
    let text = program.to_string();
    assert!(text.contains("string 0: \"hi\""));
    assert!(text.contains("NEW_ARY 2"));
    assert!(text.contains("CPY_ARY_CHAR 0"));
}
