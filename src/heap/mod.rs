//! The tracked heap: an ordered, immutable log of heap operations plus markers.
//!
//! A [`TrackedHeap`] is only ever produced by a [`TrackedHeapBuilder`], either
//! directly, by wire decoding, or by combining heaps. Selection and filtering
//! return new heaps; nothing mutates a heap in place.

mod builder;
mod marker;
mod operation;

pub use builder::{BuildError, TrackedHeapBuilder};
pub use marker::Marker;
pub use operation::{HeapOperation, OperationKind};

use std::collections::HashMap;
use std::fmt;

use crate::range::Range;

/// Ordered operation log with named markers.
///
/// Positions into the log are indexes into [`TrackedHeap::operations`]. For
/// heaps built from seed 0 (everything this crate produces) an operation's
/// `seq_no` equals its position, and marker positions are sequence numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedHeap {
    operations: Vec<HeapOperation>,
    markers: Vec<Marker>,
}

impl TrackedHeap {
    /// Start a builder numbering operations from 0.
    pub fn builder() -> TrackedHeapBuilder {
        TrackedHeapBuilder::new()
    }

    /// All operations in log order.
    pub fn operations(&self) -> &[HeapOperation] {
        &self.operations
    }

    /// All markers in insertion order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the log holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation at `position`.
    pub fn operation(&self, position: usize) -> Option<&HeapOperation> {
        self.operations.get(position)
    }

    /// Marker with the given name and index.
    pub fn marker(&self, name: &str, index: u64) -> Option<&Marker> {
        self.markers
            .iter()
            .find(|marker| marker.name == name && marker.index == index)
    }

    /// Markers sitting just before the operation at `position`.
    pub fn markers_at(&self, position: usize) -> impl Iterator<Item = &Marker> + '_ {
        self.markers
            .iter()
            .filter(move |marker| marker.first_operation_seq_no == position as u64)
    }

    /// Append the operations and markers of `heaps` in order.
    ///
    /// Operations are renumbered so the result is numbered from 0 without
    /// gaps; marker positions are kept as sent.
    pub fn concatenate<I>(heaps: I) -> Result<TrackedHeap, BuildError>
    where
        I: IntoIterator<Item = TrackedHeap>,
    {
        let mut builder = TrackedHeapBuilder::new();
        let mut markers = Vec::new();
        for heap in heaps {
            builder = builder.add_operations(heap.operations);
            markers.extend(heap.markers);
        }
        Ok(builder.add_markers(markers)?.build())
    }

    /// New heap holding only the operations of `range` (in ascending order),
    /// renumbered from 0. Markers inside the range, including one trailing
    /// the last selected operation, move along with their operations.
    pub fn truncate(range: &Range<'_>) -> TrackedHeap {
        let heap = range.heap();
        let (lo, hi) = range.ascending();
        let markers = heap
            .markers
            .iter()
            .filter(|marker| {
                let position = marker.first_operation_seq_no;
                position >= lo as u64 && position <= hi as u64 + 1
            })
            .map(|marker| Marker {
                first_operation_seq_no: marker.first_operation_seq_no - lo as u64,
                ..marker.clone()
            });

        TrackedHeapBuilder::new()
            .add_operations(heap.operations[lo..=hi].iter().cloned())
            .add_validated_markers(markers)
            .build()
    }

    /// Drop deallocations whose allocation happened before the capture window.
    ///
    /// Matched deallocations are kept and take over the size of their
    /// allocation. The walk is linear and keeps one entry per live allocation.
    /// Marker positions are remapped to the first surviving operation at or
    /// after their original position.
    pub fn without_unmatched_deallocs(&self) -> TrackedHeap {
        let seed = self.operations.first().map_or(0, |op| op.seq_no);
        let mut open_allocs: HashMap<u64, &HeapOperation> = HashMap::new();
        let mut kept = Vec::with_capacity(self.operations.len());
        // kept_before[i]: number of surviving operations before position i
        let mut kept_before = Vec::with_capacity(self.operations.len() + 1);

        for operation in &self.operations {
            kept_before.push(kept.len() as u64);
            match operation.kind {
                OperationKind::Alloc => {
                    open_allocs.insert(operation.address, operation);
                    kept.push(operation.clone());
                }
                OperationKind::Dealloc => {
                    if let Some(alloc) = open_allocs.remove(&operation.address) {
                        kept.push(operation.matched_with(alloc));
                    }
                }
            }
        }
        kept_before.push(kept.len() as u64);

        let dropped = (self.operations.len() - kept.len()) as u64;
        let markers = self.markers.iter().map(|marker| {
            let position = marker.first_operation_seq_no;
            let remapped = match kept_before.get(position as usize) {
                Some(&before) => before,
                None => position.saturating_sub(dropped),
            };
            Marker {
                first_operation_seq_no: remapped,
                ..marker.clone()
            }
        });

        TrackedHeapBuilder::starting_at(seed)
            .add_operations(kept)
            .add_validated_markers(markers)
            .build()
    }
}

impl fmt::Display for TrackedHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.operations.is_empty() {
            f.write_str("heap operations:")?;
            let mut cumulative: i128 = 0;
            for operation in &self.operations {
                cumulative += operation.size_delta();
                if !operation.is_sentinel() {
                    write!(f, "\n  {operation} -> {cumulative}")?;
                }
            }
        }

        if !self.markers.is_empty() {
            f.write_str("\n\nmarkers:")?;
            for marker in &self.markers {
                write!(f, "\n  {marker}")?;
            }
        }
        Ok(())
    }
}
