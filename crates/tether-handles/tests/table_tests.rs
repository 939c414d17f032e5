//! Handle table correctness tests across threads and kinds.
//!
//! These exercise the boundary contract end to end: token uniqueness under
//! concurrent allocation, partition isolation between kinds, and the weak
//! staleness bound.

use std::collections::HashSet;
use std::sync::Arc;
use tether_handles::{
    CollectionClock, CycleCounter, Handle, HandleError, HandleKind, HandleTable,
};

type Obj = Arc<String>;

fn make_table() -> (Arc<CycleCounter>, Arc<HandleTable<Obj>>) {
    let clock = Arc::new(CycleCounter::new());
    let table = Arc::new(HandleTable::new(clock.clone() as Arc<dyn CollectionClock>));
    (clock, table)
}

#[test]
fn test_concurrent_allocations_never_share_tokens() {
    let (_, table) = make_table();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let handles: Vec<Vec<Handle>> = std::thread::scope(|s| {
        (0..THREADS)
            .map(|t| {
                let table = Arc::clone(&table);
                s.spawn(move || {
                    let mut issued = Vec::with_capacity(PER_THREAD);
                    for i in 0..PER_THREAD {
                        let kind = HandleKind::ALL[i % 3];
                        let value = Arc::new(format!("obj-{t}-{i}"));
                        issued.push(table.allocate(value, kind).unwrap());
                    }
                    issued
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|j| j.join().unwrap())
            .collect()
    });

    let mut seen = HashSet::new();
    for batch in &handles {
        for h in batch {
            assert!(seen.insert(h.to_raw()), "token collision on {h:?}");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
}

#[test]
fn test_concurrent_get_free_mix() {
    let (_, table) = make_table();
    let handles: Vec<Handle> = (0..1000)
        .map(|i| {
            table
                .allocate(Arc::new(format!("obj-{i}")), HandleKind::Normal)
                .unwrap()
        })
        .collect();

    std::thread::scope(|s| {
        for chunk in handles.chunks(250) {
            let table = Arc::clone(&table);
            s.spawn(move || {
                for &h in chunk {
                    assert!(table.get(h).unwrap().is_some());
                    table.free(h).unwrap();
                    assert_eq!(
                        table.free(h),
                        Err(HandleError::InvalidHandle { handle: h })
                    );
                }
            });
        }
    });
    assert!(table.is_empty());
}

#[test]
fn test_kind_partitions_do_not_alias() {
    let (_, table) = make_table();
    let n = table
        .allocate(Arc::new("normal".to_string()), HandleKind::Normal)
        .unwrap();
    let p = table
        .allocate(Arc::new("pinned".to_string()), HandleKind::Pinned)
        .unwrap();

    // Same counter value, different tag: freeing one partition's entry must
    // not disturb the other's.
    assert_eq!(n.index(), p.index());
    table.free(n).unwrap();
    assert_eq!(table.get(p).unwrap().unwrap().as_str(), "pinned");
}

#[test]
fn test_weak_staleness_bound_across_threads() {
    let (clock, table) = make_table();
    let weak = table
        .allocate(Arc::new("weak-target".to_string()), HandleKind::Weak)
        .unwrap();

    // Advance several cycles with table traffic in between; afterward the
    // weak handle may be stale but must never resolve to another object.
    for _ in 0..3 {
        clock.advance();
        let h = table
            .allocate(Arc::new("unrelated".to_string()), HandleKind::Normal)
            .unwrap();
        table.free(h).unwrap();
    }

    match table.get(weak).unwrap() {
        None => {}
        Some(resolved) => assert_eq!(resolved.as_str(), "weak-target"),
    }
}

#[test]
fn test_handle_survives_wire_round_trip() {
    let (_, table) = make_table();
    let h = table
        .allocate(Arc::new("wire".to_string()), HandleKind::Pinned)
        .unwrap();
    // Simulate the FFI hop: only the raw u64 crosses.
    let raw = h.to_raw();
    let back = Handle::from_raw(raw);
    assert_eq!(table.get(back).unwrap().unwrap().as_str(), "wire");
    table.free(back).unwrap();
}
