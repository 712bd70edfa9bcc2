#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use memdb::{HeapOperation, Marker, TrackedHeap};

/// Compare `actual` with the golden file `tests/snapshots/<name>`. With
/// `MEMDB_UPDATE_SNAPSHOTS` set the golden file is rewritten instead.
pub fn assert_snapshot(name: &str, actual: &str) {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/snapshots")
        .join(name);
    if std::env::var_os("MEMDB_UPDATE_SNAPSHOTS").is_some() {
        fs::write(&path, actual).expect("write golden file");
        return;
    }
    let expected = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("golden file {}: {e}", path.display()));
    assert_eq!(
        actual,
        expected.replace("\r\n", "\n"),
        "output differs from {}",
        path.display()
    );
}

/// `[alloc(2, 4), dealloc(2)]` with markers `begin` before the alloc and
/// `end:1` between the two.
pub fn matching_pair() -> TrackedHeap {
    TrackedHeap::builder()
        .add_operation(
            HeapOperation::alloc(2, 4)
                .with_thread_id(5)
                .with_timestamp(Duration::from_millis(200))
                .with_backtrace("alloc backtrace"),
        )
        .add_operation(
            HeapOperation::dealloc(2)
                .with_size(4)
                .with_thread_id(6)
                .with_timestamp(Duration::from_millis(400))
                .with_backtrace("dealloc backtrace"),
        )
        .add_markers(vec![Marker::new("begin", 0), Marker::indexed("end", 1, 1)])
        .expect("unique markers")
        .build()
}

/// `[alloc(1, 2), dealloc(2)]`: the dealloc frees memory the log never allocated.
pub fn unmatched_pair() -> TrackedHeap {
    TrackedHeap::builder()
        .add_operation(HeapOperation::alloc(1, 2))
        .add_operation(HeapOperation::dealloc(2).with_size(1))
        .build()
}

/// Allocations of the given sizes at distinct addresses.
pub fn allocations(sizes: &[u64]) -> TrackedHeap {
    TrackedHeap::builder()
        .add_operations(
            sizes
                .iter()
                .enumerate()
                .map(|(i, &size)| HeapOperation::alloc(0x1000 + i as u64 * 0x100, size)),
        )
        .build()
}

/// Three allocations freed in order, with a repeated `loop` marker and a
/// trailing `done` marker.
pub fn loop_scenario() -> TrackedHeap {
    TrackedHeap::builder()
        .add_operation(HeapOperation::alloc(0, 8))
        .add_operation(HeapOperation::alloc(8, 8))
        .add_operation(HeapOperation::alloc(16, 16))
        .add_operation(HeapOperation::dealloc(0).with_size(8))
        .add_operation(HeapOperation::dealloc(8).with_size(8))
        .add_operation(HeapOperation::dealloc(16).with_size(16))
        .add_markers(vec![
            Marker::indexed("loop", 0, 2),
            Marker::indexed("loop", 1, 4),
            Marker::new("done", 6),
        ])
        .expect("unique markers")
        .build()
}
