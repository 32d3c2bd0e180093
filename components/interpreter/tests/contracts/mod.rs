//! Contract tests for the machine API used by the CLI and the JIT

use bytecode_system::{assemble, JitTier};
use interpreter::{Machine, MemoryWindow, SharedOutput, VmConfig, CALL_HOTNESS, STACK_SIZE};

/// Contract: new(program, config) requires a main block
#[test]
fn contract_new_requires_main() {
    let program = assemble(".block helper()\n RTRN\n").unwrap();
    assert!(Machine::new(program, VmConfig::default()).is_err());
}

/// Contract: the memory array holds stack_size copies of every block's slots
#[test]
fn contract_memory_sized_from_program() {
    let program = assemble(".block main\n STORE_INT 2\n RTRN\n.block f()\n STORE_INT 0\n RTRN\n").unwrap();
    let machine = Machine::new(program, VmConfig::default()).unwrap();
    assert_eq!(machine.memory().len(), STACK_SIZE * 4);
}

/// Contract: execute() leaves the operand stack balanced for a balanced program
#[test]
fn contract_execute_leaves_stack_empty() {
    let program = assemble(".block main\n LIT_INT 1\n PRINT_INT\n RTRN\n").unwrap();
    let output = SharedOutput::new();
    let mut machine = Machine::new(program, VmConfig::default())
        .unwrap()
        .with_output(output.clone());
    machine.execute().unwrap();
    assert!(machine.stack().is_empty());
    assert_eq!(output.contents(), "1");
}

/// Contract: compile_block without a backend is a compile error
#[test]
fn contract_compile_block_needs_backend() {
    let program = assemble(".block main\n RTRN\n").unwrap();
    let mut machine = Machine::new(program, VmConfig::default()).unwrap();
    let main = machine.block_id("main").unwrap();
    let err = machine.compile_block(main, JitTier::Basic).unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::Compile);
}

/// Contract: default configuration
#[test]
fn contract_default_config() {
    let config = VmConfig::default();
    assert!(config.jit_enabled);
    assert!(config.optimize_enabled);
    assert_eq!(config.call_hotness, CALL_HOTNESS);
    assert_eq!(config.optimize_hotness, 2 * CALL_HOTNESS);
}

/// Contract: consecutive windows are disjoint
#[test]
fn contract_windows_disjoint() {
    let caller = MemoryWindow::new(0, 3);
    let callee = caller.callee(2);
    assert_eq!(callee, MemoryWindow::new(3, 2));
    assert!(!caller.overlaps(&callee));
}
