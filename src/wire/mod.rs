//! Protobuf schema shared with the heap tracking server
//!
//! ```text
//! message Update {
//!   repeated HeapOperation heap_operations = 1;
//!   repeated Marker markers = 2;
//!   bool end_of_file = 3;
//! }
//! message HeapOperation {
//!   Kind kind = 1; uint64 micros_since_start = 2; uint64 address = 3;
//!   uint64 size = 4; uint64 thread_id = 5; string backtrace = 6;
//! }
//! enum Kind { ALLOC = 0; DEALLOC = 1; }
//! message Marker { string name = 1; optional uint64 index = 2; uint64 first_operation_seq_no = 3; }
//! ```
//!
//! Snapshots on disk are a single bare `Update`. On a socket, updates are
//! either sent back to back without framing or each preceded by a varint
//! length.

use std::time::Duration;

use prost::Message;
use thiserror::Error;

use crate::heap::{BuildError, HeapOperation, Marker, OperationKind, TrackedHeap, TrackedHeapBuilder};

/// Longest possible varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Largest length-prefixed frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Errors produced while decoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The bytes are not a valid protobuf `Update`.
    #[error("malformed update message")]
    Decode(#[from] prost::DecodeError),

    /// The update decoded but its markers collide.
    #[error(transparent)]
    InvalidHeap(#[from] BuildError),

    /// A varint length prefix did not terminate within 10 bytes.
    #[error("length prefix exceeds 10 bytes")]
    InvalidLengthPrefix,

    /// A length prefix announced a frame larger than [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the limit of {max} bytes", max = MAX_FRAME_LEN)]
    FrameTooLarge(usize),
}

/// One batch of operations and markers.
#[derive(Clone, PartialEq, Message)]
pub struct Update {
    /// Operations in log order.
    #[prost(message, repeated, tag = "1")]
    pub heap_operations: Vec<HeapOperationRecord>,
    /// Markers sent with this batch.
    #[prost(message, repeated, tag = "2")]
    pub markers: Vec<MarkerRecord>,
    /// Set by the server on its last update.
    #[prost(bool, tag = "3")]
    pub end_of_file: bool,
}

/// Wire form of a [`HeapOperation`].
#[derive(Clone, PartialEq, Message)]
pub struct HeapOperationRecord {
    /// A [`RecordKind`] value; unknown values are skipped on decode.
    #[prost(enumeration = "RecordKind", tag = "1")]
    pub kind: i32,
    /// Time since the server started observing.
    #[prost(uint64, tag = "2")]
    pub micros_since_start: u64,
    /// Allocated or released address.
    #[prost(uint64, tag = "3")]
    pub address: u64,
    /// Size in bytes.
    #[prost(uint64, tag = "4")]
    pub size: u64,
    /// Thread that executed the operation.
    #[prost(uint64, tag = "5")]
    pub thread_id: u64,
    /// Call-site backtrace.
    #[prost(string, tag = "6")]
    pub backtrace: String,
}

/// Operation kind on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RecordKind {
    /// Allocation.
    Alloc = 0,
    /// Deallocation.
    Dealloc = 1,
}

/// Wire form of a [`Marker`].
#[derive(Clone, PartialEq, Message)]
pub struct MarkerRecord {
    /// Marker name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Marker index; absent means 0.
    #[prost(uint64, optional, tag = "2")]
    pub index: Option<u64>,
    /// Sequence number of the operation right after the marker.
    #[prost(uint64, tag = "3")]
    pub first_operation_seq_no: u64,
}

impl HeapOperationRecord {
    fn is_sentinel(&self) -> bool {
        self.kind == RecordKind::Alloc as i32 && self.size == 0
    }

    /// `None` for unknown kinds.
    fn to_operation(&self) -> Option<HeapOperation> {
        let operation = match RecordKind::try_from(self.kind).ok()? {
            RecordKind::Alloc => HeapOperation::alloc(self.address, self.size),
            RecordKind::Dealloc => HeapOperation::dealloc(self.address).with_size(self.size),
        };
        Some(
            operation
                .with_timestamp(Duration::from_micros(self.micros_since_start))
                .with_thread_id(self.thread_id)
                .with_backtrace(self.backtrace.clone()),
        )
    }
}

impl From<&HeapOperation> for HeapOperationRecord {
    fn from(operation: &HeapOperation) -> Self {
        let kind = match operation.kind {
            OperationKind::Alloc => RecordKind::Alloc,
            OperationKind::Dealloc => RecordKind::Dealloc,
        };
        Self {
            kind: kind as i32,
            micros_since_start: u64::try_from(operation.timestamp.as_micros()).unwrap_or(u64::MAX),
            address: operation.address,
            size: operation.size,
            thread_id: operation.thread_id,
            backtrace: operation.backtrace.clone(),
        }
    }
}

impl From<&Marker> for MarkerRecord {
    fn from(marker: &Marker) -> Self {
        Self {
            name: marker.name.clone(),
            index: (marker.index != 0).then_some(marker.index),
            first_operation_seq_no: marker.first_operation_seq_no,
        }
    }
}

impl From<&MarkerRecord> for Marker {
    fn from(record: &MarkerRecord) -> Self {
        Marker::indexed(
            record.name.clone(),
            record.index.unwrap_or(0),
            record.first_operation_seq_no,
        )
    }
}

impl Update {
    /// True when the last raw operation is the end-of-capture sentinel or the
    /// server flagged the end of the stream.
    pub fn is_last(&self) -> bool {
        self.end_of_file
            || self
                .heap_operations
                .last()
                .is_some_and(HeapOperationRecord::is_sentinel)
    }

    /// Snapshot of a whole heap.
    pub fn from_heap(heap: &TrackedHeap) -> Self {
        Self {
            heap_operations: heap.operations().iter().map(HeapOperationRecord::from).collect(),
            markers: heap.markers().iter().map(MarkerRecord::from).collect(),
            end_of_file: false,
        }
    }

    /// Heap fragment numbered from 0. Unknown kinds are dropped; zero-sized
    /// allocations are kept.
    pub fn to_heap(&self) -> Result<TrackedHeap, BuildError> {
        let operations = self
            .heap_operations
            .iter()
            .filter_map(HeapOperationRecord::to_operation);
        Ok(TrackedHeapBuilder::new()
            .add_operations(operations)
            .add_markers(self.markers.iter().map(Marker::from))?
            .build())
    }
}

/// A decoded update together with its end-of-stream flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Operations and markers of the update.
    pub heap: TrackedHeap,
    /// Whether the stream ends with this update.
    pub is_last: bool,
}

/// Serialize a heap as one bare `Update`.
pub fn encode(heap: &TrackedHeap) -> Vec<u8> {
    Update::from_heap(heap).encode_to_vec()
}

/// Serialize a heap as one varint-length-prefixed `Update`.
pub fn encode_length_delimited(heap: &TrackedHeap) -> Vec<u8> {
    Update::from_heap(heap).encode_length_delimited_to_vec()
}

/// Decode one bare `Update` into a heap numbered from 0.
pub fn decode(bytes: &[u8]) -> Result<TrackedHeap, WireError> {
    Ok(Update::decode(bytes)?.to_heap()?)
}

/// Decode one bare `Update` received during a capture.
///
/// A trailing sentinel only ends the stream and is not part of the heap.
pub fn decode_batch(bytes: &[u8]) -> Result<Batch, WireError> {
    let mut update = Update::decode(bytes)?;
    let is_last = update.is_last();
    if update
        .heap_operations
        .last()
        .is_some_and(HeapOperationRecord::is_sentinel)
    {
        update.heap_operations.pop();
    }
    Ok(Batch {
        is_last,
        heap: update.to_heap()?,
    })
}

/// Split the first complete length-prefixed frame off `buffer`.
///
/// Returns `Ok(None)` while the prefix or the body is still incomplete.
pub fn take_length_delimited(buffer: &mut Vec<u8>) -> Result<Option<Vec<u8>>, WireError> {
    let Some(prefix_end) = buffer
        .iter()
        .take(MAX_VARINT_LEN)
        .position(|byte| byte & 0x80 == 0)
    else {
        if buffer.len() >= MAX_VARINT_LEN {
            return Err(WireError::InvalidLengthPrefix);
        }
        return Ok(None);
    };

    let length = prost::decode_length_delimiter(&buffer[..=prefix_end])?;
    if length > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(length));
    }
    let body_start = prefix_end + 1;
    let body_end = body_start
        .checked_add(length)
        .ok_or(WireError::FrameTooLarge(length))?;
    if buffer.len() < body_end {
        return Ok(None);
    }
    let frame = buffer[body_start..body_end].to_vec();
    buffer.drain(..body_end);
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: i32, address: u64, size: u64) -> HeapOperationRecord {
        HeapOperationRecord {
            kind,
            micros_since_start: 0,
            address,
            size,
            thread_id: 0,
            backtrace: String::new(),
        }
    }

    #[test]
    fn unknown_kinds_are_dropped() {
        let update = Update {
            heap_operations: vec![
                record(0, 1, 4),
                record(7, 2, 4),
                record(1, 1, 0),
                record(0, 0, 0),
            ],
            markers: vec![],
            end_of_file: false,
        };
        assert!(update.is_last());

        let heap = update.to_heap().unwrap();
        assert_eq!(heap.len(), 3);
        assert_eq!(heap.operations()[1].kind, OperationKind::Dealloc);
        assert_eq!(heap.operations()[1].seq_no, 1);
        assert_eq!(heap.operations()[2].size, 0);
    }

    #[test]
    fn batch_strips_only_trailing_sentinel() {
        let update = Update {
            heap_operations: vec![record(0, 1, 0), record(0, 2, 4), record(0, 0, 0)],
            markers: vec![],
            end_of_file: false,
        };
        let batch = decode_batch(&update.encode_to_vec()).unwrap();
        assert!(batch.is_last);
        let sizes: Vec<u64> = batch.heap.operations().iter().map(|op| op.size).collect();
        assert_eq!(sizes, vec![0, 4]);
    }

    #[test]
    fn zero_sized_alloc_survives_snapshot_encoding() {
        let heap = TrackedHeap::builder()
            .add_operation(HeapOperation::alloc(1, 0))
            .add_operation(HeapOperation::alloc(2, 4))
            .build();
        assert_eq!(decode(&encode(&heap)).unwrap(), heap);
    }

    #[test]
    fn end_of_file_flag_ends_stream() {
        let update = Update {
            heap_operations: vec![record(0, 1, 4)],
            markers: vec![],
            end_of_file: true,
        };
        assert!(update.is_last());
    }

    #[test]
    fn missing_marker_index_is_zero() {
        let record = MarkerRecord {
            name: "begin".to_string(),
            index: None,
            first_operation_seq_no: 3,
        };
        assert_eq!(Marker::from(&record), Marker::new("begin", 3));
    }

    #[test]
    fn length_delimited_frames_split_incrementally() {
        let heap = TrackedHeap::builder()
            .add_operation(HeapOperation::alloc(16, 8))
            .build();
        let frame = encode_length_delimited(&heap);
        let mut buffer = frame[..frame.len() - 1].to_vec();
        assert_eq!(take_length_delimited(&mut buffer).unwrap(), None);

        buffer.push(frame[frame.len() - 1]);
        buffer.extend_from_slice(&frame);
        let first = take_length_delimited(&mut buffer).unwrap().unwrap();
        assert_eq!(decode(&first).unwrap(), heap);
        assert!(take_length_delimited(&mut buffer).unwrap().is_some());
        assert!(buffer.is_empty());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        // varint encoding of u64::MAX
        let mut buffer = vec![0xff; MAX_VARINT_LEN - 1];
        buffer.push(0x01);
        assert!(matches!(
            take_length_delimited(&mut buffer),
            Err(WireError::FrameTooLarge(_))
        ));

        let mut buffer = Vec::new();
        prost::encode_length_delimiter(MAX_FRAME_LEN + 1, &mut buffer).unwrap();
        assert!(matches!(
            take_length_delimited(&mut buffer),
            Err(WireError::FrameTooLarge(len)) if len == MAX_FRAME_LEN + 1
        ));
    }

    #[test]
    fn runaway_prefix_is_rejected() {
        let mut buffer = vec![0xff; MAX_VARINT_LEN];
        assert!(matches!(
            take_length_delimited(&mut buffer),
            Err(WireError::InvalidLengthPrefix)
        ));
    }
}
