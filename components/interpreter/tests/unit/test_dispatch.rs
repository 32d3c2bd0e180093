//! Tests for opcode semantics in the interpreted tier

use super::{machine, run_interpreted};
use interpreter::VmConfig;

#[test]
fn test_left_operand_is_top_of_stack() {
    // right pushed first, left on top: 10 - 3
    let out = run_interpreted(".block main\n LIT_INT 3\n LIT_INT 10\n SUB_INT\n PRINT_INT\n RTRN\n");
    assert_eq!(out, "7");
}

#[test]
fn test_int_division_and_modulo_truncate() {
    let source = "\
.block main
    LIT_INT 2
    LIT_INT -7
    DIV_INT
    PRINT_INT
    LIT_CHAR ' '
    PRINT_CHAR
    LIT_INT 2
    LIT_INT -7
    MOD_INT
    PRINT_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "-3 -1");
}

#[test]
fn test_relational_ops_push_one_or_zero() {
    let source = "\
.block main
    LIT_INT 5
    LIT_INT 1
    LE_INT
    PRINT_INT
    LIT_INT 5
    LIT_INT 1
    GE_INT
    PRINT_INT
    LIT_INT 4
    LIT_INT 4
    LEQ_INT
    PRINT_INT
    LIT_INT 4
    LIT_INT 4
    NEQ_INT
    PRINT_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "1010");
}

#[test]
fn test_float_arithmetic_and_printing() {
    let source = "\
.block main
    LIT_FLOAT 4.0
    LIT_FLOAT 10.0
    DIV_FLOAT
    PRINT_FLOAT
    LIT_CHAR ' '
    PRINT_CHAR
    LIT_FLOAT 3.0
    LIT_FLOAT 7.5
    MOD_FLOAT
    PRINT_FLOAT
    RTRN
";
    assert_eq!(run_interpreted(source), "2.5 1.5");
}

#[test]
fn test_conversions() {
    let source = "\
.block main
    LIT_FLOAT -2.75
    F2I
    PRINT_INT
    LIT_CHAR ' '
    PRINT_CHAR
    LIT_INT 3
    I2F
    PRINT_FLOAT
    RTRN
";
    assert_eq!(run_interpreted(source), "-2 3");
}

#[test]
fn test_logical_ops() {
    let source = "\
.block main
    LIT_INT 0
    LIT_INT 3
    LOGICAL_AND
    PRINT_INT
    LIT_INT 0
    LIT_INT 3
    LOGICAL_OR
    PRINT_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "01");
}

#[test]
fn test_fused_literal_ops() {
    let source = "\
.block main
    LIT_INT 10
    STORE_INT 0
    LIT_LOAD_ADD 0 5
    PRINT_INT
    LIT_LOAD_SUB 0 5
    PRINT_INT
    LIT_LOAD_LE 0 11
    PRINT_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "1551");
}

#[test]
fn test_factorial_recursion() {
    let source = "\
.block main
    LIT_INT 5
    CALL fact(int)
    PRINT_INT
    RTRN

.block fact(int)
    STORE_INT 0
    LIT_INT 2
    LOAD_INT 0
    LE_INT
    FJMP recurse
    LIT_INT 1
    RTRN
recurse:
    LIT_LOAD_SUB 0 1
    CALL fact(int)
    LOAD_INT 0
    MUL_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "120");
}

#[test]
fn test_sum_loop() {
    let source = "\
.block main
    LIT_INT 0
    STORE_INT 0
    LIT_INT 1
    STORE_INT 1
top:
    LIT_LOAD_LE 1 1001
    FJMP done
    LOAD_INT 1
    LOAD_INT 0
    ADD_INT
    STORE_INT 0
    LIT_LOAD_ADD 1 1
    STORE_INT 1
    UJMP top
done:
    LOAD_INT 0
    PRINT_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "500500");
}

#[test]
fn test_string_copied_into_array() {
    let source = "\
.block main
    NEW_ARY 2
    CPY_ARY_CHAR \"hi\"
    STORE_ARY 0
    LOAD_ARY 0
    PRINT_ARY_CHAR
    RTRN
";
    assert_eq!(run_interpreted(source), "hi");
}

#[test]
fn test_array_elements() {
    let source = "\
.block main
    NEW_ARY 3
    STORE_ARY 0
    LIT_INT 42
    LIT_INT 2
    STORE_ARY_ELM_INT 0
    LIT_INT 2
    LOAD_ARY_ELM_INT 0
    PRINT_INT
    RTRN
";
    assert_eq!(run_interpreted(source), "42");
}

#[test]
fn test_struct_fields() {
    let source = "\
.block main
    LIT_INT 16
    MALLOC
    STORE_INT 0
    LIT_INT 300
    LOAD_INT 0
    STRUCT_STORE_INT 8
    LIT_CHAR 'z'
    LOAD_INT 0
    STRUCT_STORE_CHAR 1
    LOAD_INT 0
    STRUCT_LOAD_INT 8
    PRINT_INT
    LOAD_INT 0
    STRUCT_LOAD_CHAR 1
    PRINT_CHAR
    RTRN
";
    assert_eq!(run_interpreted(source), "300z");
}

#[test]
fn test_callee_windows_do_not_clobber_caller_locals() {
    let source = "\
.block main
    LIT_INT 11
    STORE_INT 0
    LIT_INT 22
    STORE_INT 1
    CALL clobber()
    LOAD_INT 0
    PRINT_INT
    LOAD_INT 1
    PRINT_INT
    RTRN

.block clobber()
    LIT_INT 99
    STORE_INT 0
    LIT_INT 99
    STORE_INT 1
    RTRN
";
    assert_eq!(run_interpreted(source), "1122");
}

#[test]
fn test_unreachable_garbage_is_collected() {
    let source = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 50
    FJMP done
    LIT_INT 64
    MALLOC
    STORE_INT 1
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    RTRN
";
    let config = VmConfig::default().with_jit(false).with_gc_threshold(10);
    let (mut machine, _) = machine(source, config);
    machine.execute().unwrap();
    let stats = machine.gc_stats();
    assert_eq!(stats.allocations, 50);
    assert!(stats.collections >= 1);
    assert!(machine.memory_manager().live_count() < 50);
}
