//! Allocation/deallocation reconciliation over a range
//!
//! Within the selected window every allocation is provisionally added. A
//! deallocation of an address that was added earlier in the window cancels it;
//! any other deallocation counts as removed memory.

use std::fmt;

use crate::heap::{HeapOperation, OperationKind, TrackedHeap};
use crate::plot::{Theme, NO_DIFF};
use crate::range::{Range, RangeError};

/// Net change in live allocations between two points of a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    added: Vec<HeapOperation>,
    removed: Vec<HeapOperation>,
}

/// Resolve `spec` against `heap` and reconcile the selected operations.
pub fn compute(heap: &TrackedHeap, spec: &str) -> Result<Diff, RangeError> {
    let range = Range::parse(heap, spec)?;
    Ok(Diff::over(&range))
}

impl Diff {
    /// Reconcile the operations of `range`, both ends inclusive.
    ///
    /// A reversed range describes going back in time, so its added and removed
    /// sets are swapped.
    pub fn over(range: &Range<'_>) -> Diff {
        let (lo, hi) = range.ascending();
        let mut added: Vec<HeapOperation> = Vec::new();
        let mut removed = Vec::new();

        for operation in &range.heap().operations()[lo..=hi] {
            match operation.kind {
                OperationKind::Alloc => added.push(operation.clone()),
                OperationKind::Dealloc => {
                    match added.iter().position(|a| a.address == operation.address) {
                        Some(index) => {
                            added.remove(index);
                        }
                        None => removed.push(operation.clone()),
                    }
                }
            }
        }

        if range.is_reversed() {
            std::mem::swap(&mut added, &mut removed);
        }
        Diff { added, removed }
    }

    /// Allocations still live at the end of the window.
    pub fn added(&self) -> &[HeapOperation] {
        &self.added
    }

    /// Deallocations of memory allocated before the window.
    pub fn removed(&self) -> &[HeapOperation] {
        &self.removed
    }

    /// True when the window leaves the heap unchanged.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total size of the added operations.
    pub fn added_bytes(&self) -> u64 {
        self.added.iter().map(|op| op.size).sum()
    }

    /// Total size of the removed operations.
    pub fn removed_bytes(&self) -> u64 {
        self.removed.iter().map(|op| op.size).sum()
    }

    /// One `+`/`-` line per operation followed by a byte summary.
    pub fn render(&self, theme: Theme) -> String {
        if self.is_empty() {
            return NO_DIFF.to_string();
        }

        let mut out = String::new();
        for operation in &self.added {
            out.push_str(&theme.added(&format!("+ {operation}")));
            out.push('\n');
        }
        for operation in &self.removed {
            out.push_str(&theme.removed(&format!("- {operation}")));
            out.push('\n');
        }

        let mut summary = Vec::with_capacity(2);
        if !self.added.is_empty() {
            summary.push(theme.added(&format!("+ {} bytes", self.added_bytes())));
        }
        if !self.removed.is_empty() {
            summary.push(theme.removed(&format!("- {} bytes", self.removed_bytes())));
        }
        out.push_str(&summary.join(", "));
        out
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Theme::plain()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unmatched_pair() -> TrackedHeap {
        TrackedHeap::builder()
            .add_operation(HeapOperation::alloc(1, 2))
            .add_operation(HeapOperation::dealloc(2).with_size(1))
            .build()
    }

    #[test]
    fn single_position_window_is_inclusive() {
        let heap = unmatched_pair();
        let diff = compute(&heap, "0..0").unwrap();
        assert_eq!(diff.added(), &heap.operations()[..1]);
        assert!(diff.removed().is_empty());
    }

    #[test]
    fn render_lists_operations_and_summary() {
        let diff = compute(&unmatched_pair(), "0..1").unwrap();
        let expected = "+ alloc[seq no: 0, duration: 0ns, address: 00000001, size: 2, thread id: 0, backtrace: <hidden>]
- dealloc[seq no: 1, duration: 0ns, address: 00000002, size: 1, thread id: 0, backtrace: <hidden>]
+ 2 bytes, - 1 bytes";
        assert_eq!(diff.to_string(), expected);
    }

    #[test]
    fn colored_render_highlights_lines() {
        let diff = compute(&unmatched_pair(), "0..0").unwrap();
        let rendered = diff.render(Theme::colored());
        assert!(rendered.starts_with("\u{1b}[32m+ alloc"));
        assert!(!rendered.contains("\u{1b}[31m"));
    }

    #[test]
    fn empty_diff_renders_sentinel() {
        let heap = TrackedHeap::builder()
            .add_operation(HeapOperation::alloc(5, 2))
            .add_operation(HeapOperation::dealloc(5).with_size(2))
            .build();
        let diff = compute(&heap, "0..1").unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.to_string(), NO_DIFF);
    }

    #[test]
    fn invalid_spec_is_reported() {
        assert!(matches!(
            compute(&unmatched_pair(), "0..2"),
            Err(RangeError::MalformedRangeSpec { .. })
        ));
    }
}
