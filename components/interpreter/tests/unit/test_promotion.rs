//! Tests for hotness counting and tier promotion
//!
//! The backend here installs hand-written routines instead of generated
//! code, so the interpreter's side of the promotion protocol can be
//! checked in isolation.

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::{BlockId, JitTier, NativeCode, Program};
use core_types::{NativeContext, VmResult};
use interpreter::{EntryRoutine, JitBackend, VmConfig};

use super::machine;

/// Pushes 7 onto the shared stack, like a compiled `LIT_INT 7; RTRN`.
unsafe extern "C" fn push_seven(ctx: *mut NativeContext) -> i64 {
    let ctx = &mut *ctx;
    *ctx.stack.add(ctx.sp as usize) = 7;
    ctx.sp += 1;
    0
}

/// Returns 7 in the return register, like optimized code.
unsafe extern "C" fn return_seven(_ctx: *mut NativeContext) -> i64 {
    7
}

/// Completes an activation without doing anything.
unsafe extern "C" fn finish(_ctx: *mut NativeContext) -> i64 {
    0
}

#[derive(Default)]
struct Log {
    compiles: Vec<(String, JitTier, u32)>,
    entries: Vec<(String, usize)>,
}

struct StubJit {
    log: Rc<RefCell<Log>>,
    /// Call count from which `can_optimize` answers yes
    eligible_at: u32,
}

impl JitBackend for StubJit {
    fn compile(&mut self, program: &mut Program, block: BlockId, tier: JitTier) -> VmResult<usize> {
        let hotness = program.block(block).hotness();
        let name = program.block(block).name().to_string();
        self.log.borrow_mut().compiles.push((name, tier, hotness));
        let entry = match tier {
            JitTier::Optimizing => return_seven as core_types::NativeFn,
            _ if program.block(block).len() > 2 => finish as core_types::NativeFn,
            _ => push_seven as core_types::NativeFn,
        };
        program
            .block_mut(block)
            .install(tier, NativeCode::new(entry, Box::new(())))?;
        if tier == JitTier::Basic {
            program.link_native_calls(block);
        }
        Ok(1)
    }

    fn compile_entry(
        &mut self,
        program: &mut Program,
        block: BlockId,
        start_ip: usize,
    ) -> VmResult<EntryRoutine> {
        let name = program.block(block).name().to_string();
        self.log.borrow_mut().entries.push((name, start_ip));
        Ok(EntryRoutine {
            code: NativeCode::new(finish, Box::new(())),
            installed: 0,
        })
    }

    fn can_optimize(&self, program: &Program, block: BlockId) -> bool {
        program.block(block).hotness() >= self.eligible_at
    }
}

const CALL_LOOP: &str = "\
.block main
    LIT_INT 0
    STORE_INT 0
    LIT_INT 0
    STORE_INT 1
top:
    LIT_LOAD_LE 0 100
    FJMP done
    CALL seven()
    LOAD_INT 1
    ADD_INT
    STORE_INT 1
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    LOAD_INT 1
    PRINT_INT
    RTRN

.block seven()
    LIT_INT 7
    RTRN
";

fn stub(optimizable: bool) -> (Box<StubJit>, Rc<RefCell<Log>>) {
    stub_eligible_at(if optimizable { 0 } else { u32::MAX })
}

fn stub_eligible_at(eligible_at: u32) -> (Box<StubJit>, Rc<RefCell<Log>>) {
    let log = Rc::new(RefCell::new(Log::default()));
    let jit = StubJit {
        log: Rc::clone(&log),
        eligible_at,
    };
    (Box::new(jit), log)
}

#[test]
fn test_call_promotion_fires_exactly_at_threshold() {
    let config = VmConfig::default()
        .with_call_hotness(10)
        .with_backedge_hotness(1000)
        .with_optimizer(false);
    let (machine, output) = machine(CALL_LOOP, config);
    let (jit, log) = stub(false);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();

    assert_eq!(output.contents(), "700");
    let log = log.borrow();
    assert_eq!(log.compiles, vec![("seven()".to_string(), JitTier::Basic, 10)]);
    let seven = machine.block_id("seven()").unwrap();
    assert_eq!(machine.program().block(seven).tier(), JitTier::Basic);
    assert_eq!(machine.program().block(seven).hotness(), 100);
    assert_eq!(machine.stats().baseline_compiles, 1);
}

#[test]
fn test_native_calls_promote_to_optimizing() {
    let config = VmConfig::default()
        .with_call_hotness(10)
        .with_optimize_hotness(20)
        .with_backedge_hotness(1000);
    let (machine, output) = machine(CALL_LOOP, config);
    let (jit, log) = stub(true);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();

    // Optimized results come back in the return register and are pushed.
    assert_eq!(output.contents(), "700");
    let log = log.borrow();
    assert_eq!(log.compiles.len(), 2);
    assert_eq!(log.compiles[1], ("seven()".to_string(), JitTier::Optimizing, 20));
    assert_eq!(machine.stats().optimizing_compiles, 1);
}

#[test]
fn test_ineligible_block_stays_basic() {
    let config = VmConfig::default()
        .with_call_hotness(10)
        .with_optimize_hotness(20)
        .with_backedge_hotness(1000);
    let (machine, _) = machine(CALL_LOOP, config);
    let (jit, log) = stub(false);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();

    assert_eq!(log.borrow().compiles.len(), 1);
    let seven = machine.block_id("seven()").unwrap();
    assert_eq!(machine.program().block(seven).tier(), JitTier::Basic);
}

#[test]
fn test_block_eligible_after_threshold_is_optimized_later() {
    let config = VmConfig::default()
        .with_call_hotness(10)
        .with_optimize_hotness(20)
        .with_backedge_hotness(1000);
    let (machine, output) = machine(CALL_LOOP, config);
    let (jit, log) = stub_eligible_at(25);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();

    assert_eq!(output.contents(), "700");
    let log = log.borrow();
    assert_eq!(log.compiles.len(), 2);
    assert_eq!(log.compiles[1], ("seven()".to_string(), JitTier::Optimizing, 25));
    let seven = machine.block_id("seven()").unwrap();
    assert_eq!(machine.program().block(seven).tier(), JitTier::Optimizing);
    assert_eq!(machine.stats().optimizing_compiles, 1);
}

#[test]
fn test_hot_backedge_bounces_into_native_code() {
    let source = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LOAD_INT 0
    PRINT_INT
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    LIT_LOAD_LE 0 10
    FJMP done
    UJMP top
done:
    RTRN
";
    let config = VmConfig::default().with_backedge_hotness(3);
    let (machine, output) = machine(source, config);
    let (jit, log) = stub(false);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();

    // Three iterations ran interpreted; the routine finished the activation.
    assert_eq!(output.contents(), "012");
    let log = log.borrow();
    assert_eq!(log.entries, vec![("main".to_string(), 2)]);
    assert_eq!(log.compiles.len(), 1);
    assert_eq!(machine.stats().backedge_bounces, 1);
    let main = machine.block_id("main").unwrap();
    assert_eq!(machine.program().block(main).tier(), JitTier::Basic);
}

#[test]
fn test_forward_jumps_are_not_backedges() {
    let source = "\
.block main
    UJMP skip
    LIT_INT 1
    PRINT_INT
skip:
    RTRN
";
    let config = VmConfig::default().with_backedge_hotness(1);
    let (machine, output) = machine(source, config);
    let (jit, log) = stub(false);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();
    assert_eq!(output.contents(), "");
    assert!(log.borrow().entries.is_empty());
}

#[test]
fn test_disabled_jit_ignores_backend() {
    let config = VmConfig::default().with_jit(false).with_call_hotness(1);
    let (machine, output) = machine(CALL_LOOP, config);
    let (jit, log) = stub(true);
    let mut machine = machine.with_jit(jit);
    machine.execute().unwrap();
    assert_eq!(output.contents(), "700");
    assert!(log.borrow().compiles.is_empty());
}
