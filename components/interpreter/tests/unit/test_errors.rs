//! Tests for fatal runtime errors in the interpreted tier

use super::machine;
use core_types::ErrorKind;
use interpreter::VmConfig;

fn fail(source: &str) -> core_types::VmError {
    let (mut machine, _) = machine(source, VmConfig::default().with_jit(false));
    machine.execute().unwrap_err()
}

#[test]
fn test_division_by_zero() {
    let err = fail(".block main\n LIT_INT 0\n LIT_INT 1\n DIV_INT\n RTRN\n");
    assert_eq!(err.kind, ErrorKind::Arithmetic);
    assert!(err.message.contains("division by zero"));
}

#[test]
fn test_modulo_overflow() {
    let source = format!(".block main\n LIT_INT -1\n LIT_INT {}\n MOD_INT\n RTRN\n", i64::MIN);
    let err = fail(&source);
    assert_eq!(err.kind, ErrorKind::Arithmetic);
}

#[test]
fn test_stack_underflow() {
    let err = fail(".block main\n ADD_INT\n RTRN\n");
    assert_eq!(err.kind, ErrorKind::Bounds);
}

#[test]
fn test_empty_main_returns_cleanly() {
    let (mut machine, output) = machine(".block main\n", VmConfig::default().with_jit(false));
    assert!(machine.execute().is_ok());
    assert_eq!(output.contents(), "");
}

#[test]
fn test_empty_callee_still_runs_off_the_end() {
    let err = fail(".block main\n CALL empty()\n RTRN\n.block empty()\n");
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn test_running_off_the_end_of_a_block() {
    let err = fail(".block main\n LIT_INT 1\n");
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn test_unbounded_recursion_exhausts_frames() {
    let source = "\
.block main
    CALL forever()
    RTRN

.block forever()
    CALL forever()
    RTRN
";
    let config = VmConfig::default().with_jit(false).with_stack_size(16);
    let (mut machine, _) = machine(source, config);
    let err = machine.execute().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Bounds);
    assert_eq!(err.stack.last().map(String::as_str), Some("forever()"));
}

#[test]
fn test_array_index_out_of_bounds() {
    let source = "\
.block main
    NEW_ARY 2
    STORE_ARY 0
    LIT_INT 2
    LOAD_ARY_ELM_INT 0
    RTRN
";
    let err = fail(source);
    assert_eq!(err.kind, ErrorKind::Bounds);
}

#[test]
fn test_string_longer_than_array() {
    let err = fail(".block main\n NEW_ARY 1\n CPY_ARY_CHAR \"long\"\n RTRN\n");
    assert_eq!(err.kind, ErrorKind::Bounds);
}

#[test]
fn test_output_before_error_is_flushed() {
    let (mut machine, output) = machine(
        ".block main\n LIT_INT 7\n PRINT_INT\n LIT_INT 0\n LIT_INT 1\n MOD_INT\n RTRN\n",
        VmConfig::default().with_jit(false),
    );
    assert!(machine.execute().is_err());
    assert_eq!(output.contents(), "7");
}
