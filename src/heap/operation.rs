//! Single recorded heap event

use std::fmt;
use std::time::Duration;

/// Whether an operation allocated or released memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Memory was allocated at `address`.
    Alloc,
    /// Memory at `address` was released.
    Dealloc,
}

/// One allocation or deallocation observed in the remote process.
///
/// Operations are plain values. Their `seq_no` is assigned by
/// [`TrackedHeapBuilder`](super::TrackedHeapBuilder) when they are appended to
/// a log, so the constructors below leave it at zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeapOperation {
    /// Position of the operation in its owning log.
    pub seq_no: u64,
    /// Allocation or deallocation.
    pub kind: OperationKind,
    /// Time since the remote process started observing its heap.
    pub timestamp: Duration,
    /// Allocated or released address.
    pub address: u64,
    /// Size in bytes. Zero for a deallocation until it is matched to its allocation.
    pub size: u64,
    /// Thread that executed the operation.
    pub thread_id: u64,
    /// Full backtrace of the call site. Can be large.
    pub backtrace: String,
}

impl HeapOperation {
    /// Allocation of `size` bytes at `address`.
    pub fn alloc(address: u64, size: u64) -> Self {
        Self {
            seq_no: 0,
            kind: OperationKind::Alloc,
            timestamp: Duration::ZERO,
            address,
            size,
            thread_id: 0,
            backtrace: String::new(),
        }
    }

    /// Deallocation of `address`. The size stays 0 until matched.
    pub fn dealloc(address: u64) -> Self {
        Self {
            kind: OperationKind::Dealloc,
            ..Self::alloc(address, 0)
        }
    }

    /// Zero-sized allocation the server appends to its final batch.
    pub fn sentinel() -> Self {
        Self::alloc(0, 0)
    }

    /// Override the size (used for matched deallocations).
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the thread id.
    pub fn with_thread_id(mut self, thread_id: u64) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Set the time since observation start.
    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the backtrace.
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = backtrace.into();
        self
    }

    /// Set the sequence number. Builders overwrite this on append.
    pub fn with_seq_no(mut self, seq_no: u64) -> Self {
        self.seq_no = seq_no;
        self
    }

    /// True for allocations.
    pub fn is_alloc(&self) -> bool {
        self.kind == OperationKind::Alloc
    }

    /// True for the end-of-capture marker record.
    pub fn is_sentinel(&self) -> bool {
        self.kind == OperationKind::Alloc && self.size == 0
    }

    /// Signed change in live heap bytes caused by this operation.
    pub fn size_delta(&self) -> i128 {
        match self.kind {
            OperationKind::Alloc => i128::from(self.size),
            OperationKind::Dealloc => -i128::from(self.size),
        }
    }

    /// End of the occupied address range (exclusive). Zero-sized entries
    /// still occupy one byte so they remain visible in layout plots.
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.size.max(1))
    }

    /// Copy of this deallocation carrying the size of the allocation it frees.
    pub(crate) fn matched_with(&self, alloc: &HeapOperation) -> Self {
        Self {
            size: alloc.size,
            ..self.clone()
        }
    }

    /// Single-line description; the backtrace is appended only on request.
    pub fn describe(&self, show_backtrace: bool) -> String {
        let kind = match self.kind {
            OperationKind::Alloc => "alloc",
            OperationKind::Dealloc => "dealloc",
        };
        let backtrace = if show_backtrace {
            format!("\n{}", self.backtrace)
        } else {
            " <hidden>".to_string()
        };
        format!(
            "{kind}[seq no: {}, duration: {:?}, address: {:08x}, size: {}, thread id: {}, backtrace:{backtrace}]",
            self.seq_no, self.timestamp, self.address, self.size, self.thread_id,
        )
    }
}

impl fmt::Display for HeapOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_hides_backtrace_by_default() {
        let alloc = HeapOperation::alloc(2, 16)
            .with_seq_no(26)
            .with_thread_id(5)
            .with_timestamp(Duration::from_millis(300))
            .with_backtrace("expected backtrace");

        assert_eq!(
            alloc.to_string(),
            "alloc[seq no: 26, duration: 300ms, address: 00000002, size: 16, thread id: 5, backtrace: <hidden>]"
        );
        assert_eq!(
            alloc.describe(true),
            "alloc[seq no: 26, duration: 300ms, address: 00000002, size: 16, thread id: 5, backtrace:\nexpected backtrace]"
        );
    }

    #[test]
    fn dealloc_starts_unsized() {
        let dealloc = HeapOperation::dealloc(2)
            .with_seq_no(20)
            .with_thread_id(4)
            .with_timestamp(Duration::from_millis(200));

        assert_eq!(dealloc.size, 0);
        assert!(!dealloc.is_alloc());
        assert!(!dealloc.is_sentinel());
        assert_eq!(
            dealloc.to_string(),
            "dealloc[seq no: 20, duration: 200ms, address: 00000002, size: 0, thread id: 4, backtrace: <hidden>]"
        );
    }

    #[test]
    fn matched_dealloc_takes_alloc_size() {
        let alloc = HeapOperation::alloc(8, 32);
        let dealloc = HeapOperation::dealloc(8).with_seq_no(3);
        let matched = dealloc.matched_with(&alloc);
        assert_eq!(matched.size, 32);
        assert_eq!(matched.seq_no, 3);
        assert_eq!(matched.size_delta(), -32);
    }

    #[test]
    fn sentinel_is_zero_sized_alloc() {
        assert!(HeapOperation::sentinel().is_sentinel());
        assert!(!HeapOperation::alloc(0, 1).is_sentinel());
    }
}
