//! Range and marker addressing
//!
//! A range spec has the form `from..to`. Each side is either an operation
//! position (`42`) or a marker reference (`name` or `name:index`). A marker on
//! the `from` side resolves to the operation right after it; on the `to` side
//! it resolves to the operation right before it, so `begin..end` selects
//! exactly the operations recorded between the two markers.

use thiserror::Error;

use crate::heap::TrackedHeap;

/// Errors produced while resolving range specs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The spec did not resolve to two positions inside the log.
    #[error("invalid range spec {spec}: {reason}")]
    MalformedRangeSpec {
        /// Spec text as supplied by the user.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl RangeError {
    fn malformed(spec: &str, reason: impl Into<String>) -> Self {
        RangeError::MalformedRangeSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

fn parse_marker_ref(spec: &str) -> (&str, u64) {
    match spec.split_once(':') {
        Some((name, index)) => (name, index.parse().unwrap_or(0)),
        None => (spec, 0),
    }
}

impl TrackedHeap {
    /// Resolve the start side of a range. Integers pass through unchecked.
    pub fn from_position(&self, spec: &str) -> Option<i64> {
        let spec = spec.trim();
        if let Ok(position) = spec.parse::<i64>() {
            return Some(position);
        }
        let (name, index) = parse_marker_ref(spec);
        self.marker(name, index)
            .map(|marker| marker.first_operation_seq_no as i64)
    }

    /// Resolve the end side of a range: the operation just before a marker,
    /// clamped to 0. Integers pass through unchecked.
    pub fn to_position(&self, spec: &str) -> Option<i64> {
        let spec = spec.trim();
        if let Ok(position) = spec.parse::<i64>() {
            return Some(position);
        }
        let (name, index) = parse_marker_ref(spec);
        self.marker(name, index)
            .map(|marker| (marker.first_operation_seq_no as i64 - 1).max(0))
    }
}

/// A validated interval of positions in a specific heap.
///
/// Both ends are guaranteed to lie in `[0, len - 1]`. `from` may exceed `to`;
/// consumers decide what a reversed range means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range<'a> {
    heap: &'a TrackedHeap,
    from: usize,
    to: usize,
}

impl<'a> Range<'a> {
    /// Parse and validate a `from..to` spec.
    pub fn parse(heap: &'a TrackedHeap, spec: &str) -> Result<Self, RangeError> {
        let parts: Vec<&str> = spec.split("..").collect();
        let [from_spec, to_spec] = parts.as_slice() else {
            return Err(RangeError::malformed(spec, "expected format [from]..[to]"));
        };
        let from = heap
            .from_position(from_spec)
            .ok_or_else(|| RangeError::malformed(spec, "invalid from-position"))?;
        let to = heap
            .to_position(to_spec)
            .ok_or_else(|| RangeError::malformed(spec, "invalid to-position"))?;
        Self::checked(heap, spec, from, to)
    }

    /// Validate explicit positions.
    pub fn from_bounds(heap: &'a TrackedHeap, from: i64, to: i64) -> Result<Self, RangeError> {
        Self::checked(heap, &format!("{from}..{to}"), from, to)
    }

    /// The whole log.
    pub fn whole(heap: &'a TrackedHeap) -> Result<Self, RangeError> {
        Self::from_bounds(heap, 0, heap.len() as i64 - 1)
    }

    /// Spec text selecting the whole log: `0..(len-1)`.
    pub fn whole_range_spec(heap: &TrackedHeap) -> String {
        format!("0..{}", heap.len() as i64 - 1)
    }

    fn checked(heap: &'a TrackedHeap, spec: &str, from: i64, to: i64) -> Result<Self, RangeError> {
        let check = |position: i64, side: &str| -> Result<usize, RangeError> {
            usize::try_from(position)
                .ok()
                .filter(|&p| p < heap.len())
                .ok_or_else(|| RangeError::malformed(spec, format!("invalid {side} {position}")))
        };
        let from = check(from, "from-position")?;
        let to = check(to, "to-position")?;
        Ok(Self { heap, from, to })
    }

    /// Heap the range was validated against.
    pub fn heap(&self) -> &'a TrackedHeap {
        self.heap
    }

    /// Start position as written.
    pub fn from(&self) -> usize {
        self.from
    }

    /// End position as written.
    pub fn to(&self) -> usize {
        self.to
    }

    /// Whether `from > to`.
    pub fn is_reversed(&self) -> bool {
        self.from > self.to
    }

    /// `(min, max)` of the two ends.
    pub fn ascending(&self) -> (usize, usize) {
        (self.from.min(self.to), self.from.max(self.to))
    }

    /// Number of positions covered, inclusive of both ends.
    pub fn len(&self) -> usize {
        let (lo, hi) = self.ascending();
        hi - lo + 1
    }

    /// Always false; a validated range covers at least one operation.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{HeapOperation, Marker};

    fn two_operations() -> TrackedHeap {
        TrackedHeap::builder()
            .add_operation(HeapOperation::alloc(2, 4))
            .add_operation(HeapOperation::dealloc(2).with_size(4))
            .add_markers(vec![Marker::new("begin", 0), Marker::indexed("end", 1, 1)])
            .unwrap()
            .build()
    }

    #[test]
    fn integer_positions_are_not_range_checked() {
        let heap = two_operations();
        assert_eq!(heap.from_position("1982"), Some(1982));
        assert_eq!(heap.from_position("-1"), Some(-1));
        assert_eq!(heap.to_position("-1"), Some(-1));
    }

    #[test]
    fn marker_positions() {
        let heap = two_operations();
        assert_eq!(heap.from_position("begin"), Some(0));
        assert_eq!(heap.to_position("begin"), Some(0));
        assert_eq!(heap.from_position("end:1"), Some(1));
        assert_eq!(heap.to_position("end:1"), Some(0));
        assert_eq!(heap.from_position("end"), None);
        assert_eq!(heap.to_position("arjan"), None);
    }

    #[test]
    fn non_numeric_index_falls_back_to_zero() {
        let heap = two_operations();
        assert_eq!(heap.from_position("begin:x"), Some(0));
    }

    #[test]
    fn whole_range_spec_covers_log() {
        let heap = two_operations();
        assert_eq!(Range::whole_range_spec(&heap), "0..1");
        let range = Range::whole(&heap).unwrap();
        assert_eq!((range.from(), range.to()), (0, 1));
        assert_eq!(range.len(), 2);
    }

    #[test]
    fn reversed_range_is_accepted() {
        let heap = two_operations();
        let range = Range::parse(&heap, "1..0").unwrap();
        assert!(range.is_reversed());
        assert_eq!(range.ascending(), (0, 1));
    }
}
