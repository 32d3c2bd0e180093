//! Cross-tier properties: equivalence, exact thresholds, disjoint windows

use bytecode_system::JitTier;
use integration_tests::{run, Tiers};
use interpreter::VmConfig;

/// Recursion where every frame keeps two locals live across the call.
/// depth(n) = 2n(n+1) only if no frame's slots are overwritten.
const DEPTH: &str = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 20
    FJMP done
    LIT_INT 100
    CALL depth(int)
    STORE_INT 1
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    LOAD_INT 1
    PRINT_INT
    RTRN

.block depth(int)
    STORE_INT 0
    LIT_INT 3
    LOAD_INT 0
    MUL_INT
    STORE_INT 1
    LIT_INT 0
    LOAD_INT 0
    EQ_INT
    FJMP recurse
    LIT_INT 0
    RTRN
recurse:
    LIT_LOAD_SUB 0 1
    CALL depth(int)
    LOAD_INT 1
    ADD_INT
    LOAD_INT 0
    ADD_INT
    RTRN
";

fn calls(count: u32) -> String {
    format!(
        "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 {}
    FJMP done
    CALL f()
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    RTRN

.block f()
    RTRN
",
        count
    )
}

#[test]
fn deep_recursion_keeps_windows_disjoint() {
    for tiers in Tiers::ALL {
        let (_, output) = run(DEPTH, tiers.config());
        assert_eq!(output, "20200", "{:?}", tiers);
    }
}

#[test]
fn mixed_program_output_is_tier_independent() {
    let source = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 12
    FJMP done
    LOAD_INT 0
    CALL mix(int)
    PRINT_INT
    LIT_CHAR ' '
    PRINT_CHAR
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    RTRN

.block mix(int)
    STORE_INT 0
    LIT_INT 3
    LOAD_INT 0
    MOD_INT
    LIT_INT 7
    LOAD_INT 0
    MUL_INT
    SUB_INT
    LIT_INT 2
    LOAD_INT 0
    DIV_INT
    ADD_INT
    RTRN
";
    let expected = run(source, Tiers::Interpreted.config()).1;
    for tiers in [Tiers::Baseline, Tiers::Optimizing] {
        let (_, output) = run(source, tiers.config());
        assert_eq!(output, expected, "{:?}", tiers);
    }
}

/// Struct, array, conversion and float work in one block that stays BASIC,
/// next to a float and boolean block that can be optimized.
const HEAP_AND_FLOAT: &str = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 12
    FJMP done
    LOAD_INT 0
    CALL heap(int)
    PRINT_INT
    LIT_CHAR ' '
    PRINT_CHAR
    LOAD_INT 0
    CALL arith(int)
    PRINT_INT
    LIT_CHAR ' '
    PRINT_CHAR
    LIT_FLOAT 4.0
    LOAD_INT 0
    I2F
    DIV_FLOAT
    PRINT_FLOAT
    LIT_CHAR '\\n'
    PRINT_CHAR
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    RTRN

.block heap(int)
    STORE_INT 0
    LIT_INT 16
    MALLOC
    STORE_INT 1
    LIT_INT 511
    LOAD_INT 1
    STRUCT_STORE_INT 8
    LIT_CHAR 'A'
    LOAD_INT 1
    STRUCT_STORE_CHAR 8
    LOAD_INT 0
    I2F
    LOAD_INT 1
    STRUCT_STORE_FLOAT 0
    NEW_ARY 4
    STORE_ARY 2
    LOAD_INT 1
    STRUCT_LOAD_INT 8
    LIT_INT 1
    STORE_ARY_ELM_INT 2
    LIT_FLOAT 0.5
    LOAD_INT 1
    STRUCT_LOAD_FLOAT 0
    MUL_FLOAT
    LIT_INT 2
    STORE_ARY_ELM_FLOAT 2
    LOAD_INT 1
    STRUCT_LOAD_CHAR 8
    LIT_INT 3
    STORE_ARY_ELM_CHAR 2
    LIT_INT 2
    LOAD_ARY_ELM_FLOAT 2
    F2I
    LIT_INT 1
    LOAD_ARY_ELM_INT 2
    ADD_INT
    LIT_INT 3
    LOAD_ARY_ELM_CHAR 2
    ADD_INT
    RTRN

.block arith(int)
    STORE_INT 0
    LOAD_INT 0
    I2F
    STORE_FLOAT 1
    LIT_FLOAT 3.0
    LOAD_FLOAT 1
    MOD_FLOAT
    LIT_FLOAT 1.5
    LOAD_FLOAT 1
    DIV_FLOAT
    ADD_FLOAT
    LIT_FLOAT 0.25
    SUB_FLOAT
    LIT_FLOAT 4.0
    MUL_FLOAT
    F2I
    LIT_INT 3
    LOAD_INT 0
    GE_INT
    LIT_INT 9
    LOAD_INT 0
    LE_INT
    LOGICAL_AND
    LIT_INT 0
    LOAD_INT 0
    EQ_INT
    LOGICAL_OR
    LIT_INT 1000
    MUL_INT
    ADD_INT
    RTRN
";

#[test]
fn heap_and_float_opcodes_are_tier_independent() {
    let (_, expected) = run(HEAP_AND_FLOAT, Tiers::Interpreted.config());
    // 511 with its low byte replaced by 'A' is 321; n * 0.5 truncates.
    assert!(expected.starts_with("386 1001 0\n"), "{}", expected);
    assert!(expected.ends_with("\n391 -29 2.5\n"), "{}", expected);

    for tiers in [Tiers::Baseline, Tiers::Optimizing] {
        let (machine, output) = run(HEAP_AND_FLOAT, tiers.config());
        assert_eq!(output, expected, "{:?}", tiers);

        let heap = machine.block_id("heap(int)").unwrap();
        let arith = machine.block_id("arith(int)").unwrap();
        assert_eq!(machine.program().block(heap).tier(), JitTier::Basic, "{:?}", tiers);
        let arith_tier = match tiers {
            Tiers::Optimizing => JitTier::Optimizing,
            _ => JitTier::Basic,
        };
        assert_eq!(machine.program().block(arith).tier(), arith_tier, "{:?}", tiers);
    }
}

/// `outer` reaches the optimize threshold while `inner` is still BASIC.
const LATE_CALLEE: &str = "\
.block main
    LIT_INT 0
    STORE_INT 0
top:
    LIT_LOAD_LE 0 10
    FJMP done
    LOAD_INT 0
    CALL outer(int)
    PRINT_INT
    LOAD_INT 0
    CALL outer(int)
    PRINT_INT
    LOAD_INT 0
    CALL inner(int)
    PRINT_INT
    LIT_LOAD_ADD 0 1
    STORE_INT 0
    UJMP top
done:
    RTRN

.block outer(int)
    STORE_INT 0
    LOAD_INT 0
    CALL inner(int)
    LIT_INT 1
    ADD_INT
    RTRN

.block inner(int)
    STORE_INT 0
    LIT_INT 2
    LOAD_INT 0
    MUL_INT
    RTRN
";

#[test]
fn caller_is_optimized_once_its_callee_is() {
    let (_, expected) = run(LATE_CALLEE, Tiers::Interpreted.config());
    let (machine, output) = run(LATE_CALLEE, Tiers::Optimizing.config());
    assert_eq!(output, expected);

    let outer = machine.block_id("outer(int)").unwrap();
    let inner = machine.block_id("inner(int)").unwrap();
    assert_eq!(machine.program().block(inner).tier(), JitTier::Optimizing);
    assert_eq!(machine.program().block(outer).tier(), JitTier::Optimizing);
    assert_eq!(machine.stats().optimizing_compiles, 2);
}

#[test]
fn thirty_nine_calls_stay_interpreted() {
    let config = VmConfig::default().with_backedge_hotness(10_000);
    let (machine, _) = run(&calls(39), config);
    let f = machine.block_id("f()").unwrap();
    assert_eq!(machine.program().block(f).tier(), JitTier::None);
    assert_eq!(machine.stats().baseline_compiles, 0);
}

#[test]
fn fortieth_call_compiles_exactly_once() {
    let config = VmConfig::default().with_backedge_hotness(10_000);
    let (machine, _) = run(&calls(40), config);
    let f = machine.block_id("f()").unwrap();
    assert_eq!(machine.program().block(f).tier(), JitTier::Basic);
    assert_eq!(machine.stats().baseline_compiles, 1);

    let (machine, _) = run(&calls(200), config_with_high_backedge());
    assert_eq!(machine.stats().baseline_compiles, 1);
}

#[test]
fn promotion_never_demotes() {
    let (machine, _) = run(DEPTH, Tiers::Optimizing.config());
    let depth = machine.block_id("depth(int)").unwrap();
    assert_eq!(machine.program().block(depth).tier(), JitTier::Optimizing);
    assert_eq!(machine.stats().optimizing_compiles, 1);
}

fn config_with_high_backedge() -> VmConfig {
    VmConfig::default()
        .with_backedge_hotness(10_000)
        .with_optimizer(false)
}
