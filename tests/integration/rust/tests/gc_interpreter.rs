//! Collector behaviour as seen from running programs

use integration_tests::{run, Tiers};

/// One struct kept in slot 0, then 100 allocations that are dropped at once.
const KEEP_ONE: &str = "\
.block main
    LIT_INT 16
    MALLOC
    STORE_INT 0
    LIT_INT 77
    LOAD_INT 0
    STRUCT_STORE_INT 0
    LIT_INT 0
    STORE_INT 2
top:
    LIT_LOAD_LE 2 100
    FJMP done
    LIT_INT 8
    MALLOC
    STORE_INT 1
    LIT_INT 0
    STORE_INT 1
    LIT_LOAD_ADD 2 1
    STORE_INT 2
    UJMP top
done:
    LOAD_INT 0
    STRUCT_LOAD_INT 0
    PRINT_INT
    RTRN
";

#[test]
fn reachable_struct_survives_collection() {
    let config = Tiers::Interpreted.config().with_gc_threshold(100);
    let (machine, output) = run(KEEP_ONE, config);
    let stats = machine.gc_stats();

    assert_eq!(output, "77");
    assert_eq!(stats.allocations, 101);
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.last_survivors, 1);
}

#[test]
fn native_allocations_are_collected() {
    let config = Tiers::Baseline.config().with_gc_threshold(10);
    let (machine, output) = run(KEEP_ONE, config);
    let stats = machine.gc_stats();

    assert_eq!(output, "77");
    assert_eq!(stats.allocations, 101);
    assert!(stats.collections >= 1);
    assert!(machine.memory_manager().live_count() < 101);
}
