//! Construction of tracked heaps

use std::collections::HashSet;

use thiserror::Error;

use super::{HeapOperation, Marker, TrackedHeap};

/// Errors raised while assembling a tracked heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A marker with the same `(name, index)` pair was already added.
    #[error("marker with name {name} and index {index} exists already")]
    DuplicateMarker {
        /// Name of the rejected marker.
        name: String,
        /// Index of the rejected marker.
        index: u64,
    },
}

/// Accumulates operations and markers, then freezes them into a [`TrackedHeap`].
///
/// Every appended operation receives the next sequence number from an internal
/// counter, regardless of the `seq_no` it carried before. The counter starts at
/// 0 unless the builder is created with [`TrackedHeapBuilder::starting_at`].
#[derive(Debug, Default)]
pub struct TrackedHeapBuilder {
    next_seq_no: u64,
    operations: Vec<HeapOperation>,
    markers: Vec<Marker>,
    marker_keys: HashSet<(String, u64)>,
}

impl TrackedHeapBuilder {
    /// Builder numbering operations from 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder numbering operations from `seq_no`.
    pub fn starting_at(seq_no: u64) -> Self {
        Self {
            next_seq_no: seq_no,
            ..Self::default()
        }
    }

    /// Append one operation.
    pub fn add_operation(mut self, operation: HeapOperation) -> Self {
        self.push_operation(operation);
        self
    }

    /// Append operations in iteration order.
    pub fn add_operations<I>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = HeapOperation>,
    {
        let operations = operations.into_iter();
        self.operations.reserve(operations.size_hint().0);
        for operation in operations {
            self.push_operation(operation);
        }
        self
    }

    /// Add a marker, rejecting duplicate `(name, index)` pairs.
    pub fn add_marker(mut self, marker: Marker) -> Result<Self, BuildError> {
        self.push_marker(marker)?;
        Ok(self)
    }

    /// Add markers in iteration order. Stops at the first duplicate.
    pub fn add_markers<I>(mut self, markers: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = Marker>,
    {
        for marker in markers {
            self.push_marker(marker)?;
        }
        Ok(self)
    }

    /// Freeze the accumulated operations and markers.
    pub fn build(self) -> TrackedHeap {
        TrackedHeap {
            operations: self.operations,
            markers: self.markers,
        }
    }

    fn push_operation(&mut self, mut operation: HeapOperation) {
        operation.seq_no = self.next_seq_no;
        self.next_seq_no += 1;
        self.operations.push(operation);
    }

    fn push_marker(&mut self, marker: Marker) -> Result<(), BuildError> {
        if !self.marker_keys.insert((marker.name.clone(), marker.index)) {
            return Err(BuildError::DuplicateMarker {
                name: marker.name,
                index: marker.index,
            });
        }
        self.markers.push(marker);
        Ok(())
    }

    /// Markers copied from an already validated heap.
    pub(super) fn add_validated_markers<I>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = Marker>,
    {
        for marker in markers {
            self.marker_keys.insert((marker.name.clone(), marker.index));
            self.markers.push(marker);
        }
        self
    }
}
