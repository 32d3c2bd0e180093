//! Contract tests verifying the memory_manager API.

use memory_manager::{FieldWidth, GcStats, Memory, RootSet, GC_THRESHOLD};

/// Contract: default threshold is 100 tracked cells
#[test]
fn contract_default_threshold() {
    assert_eq!(GC_THRESHOLD, 100);
}

/// Contract: allocate(size, roots) -> handle of a zeroed buffer
#[test]
fn contract_allocate_returns_zeroed_handle() {
    let mut memory = Memory::default();
    let handle = memory.allocate(16, &RootSet::default()).unwrap();
    assert_ne!(handle, 0);
    assert_eq!(memory.size_of(handle), Some(16));
    assert_eq!(memory.read_field(handle, 8, FieldWidth::Word).unwrap(), 0);
}

/// Contract: GC_THRESHOLD + 1 allocations with one retained root leave one survivor
#[test]
fn contract_collection_keeps_exactly_the_retained_cell() {
    let mut memory = Memory::default();
    let mut stack: Vec<i64> = Vec::new();

    let kept = memory.allocate(8, &RootSet::default()).unwrap();
    stack.push(kept as i64);
    for _ in 0..GC_THRESHOLD {
        let roots = RootSet {
            stack: &stack,
            memory: &[],
        };
        memory.allocate(8, &roots).unwrap();
    }

    let stats: GcStats = memory.stats();
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.last_survivors, 1);
    assert_eq!(stats.freed, (GC_THRESHOLD - 1) as u64);
    assert!(memory.contains(kept));
}

/// Contract: struct fields are addressed by byte offset
#[test]
fn contract_struct_fields_by_byte_offset() {
    let mut memory = Memory::default();
    let handle = memory.allocate(9, &RootSet::default()).unwrap();
    memory.write_field(handle, 0, FieldWidth::Word, 42).unwrap();
    memory.write_field(handle, 8, FieldWidth::Byte, b'z' as i64).unwrap();
    assert_eq!(memory.read_field(handle, 0, FieldWidth::Word).unwrap(), 42);
    assert_eq!(memory.read_field(handle, 8, FieldWidth::Byte).unwrap(), b'z' as i64);
    assert!(memory.read_field(handle, 8, FieldWidth::Word).is_err());
}

/// Contract: arrays are tracked and reclaimed like structs
#[test]
fn contract_arrays_are_collected() {
    let mut memory = Memory::default();
    let array = memory.allocate_array(4, &RootSet::default()).unwrap();
    memory.collect(&RootSet::default());
    assert!(!memory.contains(array));
    assert_eq!(memory.live_count(), 0);
}
