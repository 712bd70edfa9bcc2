//! Allocation size histograms

use std::collections::BTreeMap;
use std::fmt;

use crate::heap::TrackedHeap;

/// Smallest power of two that is at least `value`. Zero maps to zero; values
/// above 2^63 saturate to 2^63.
pub fn pow2_bucket(value: u64) -> u64 {
    if value == 0 || value.is_power_of_two() {
        value
    } else {
        value.checked_next_power_of_two().unwrap_or(1 << 63)
    }
}

/// Number of allocations per size (or per power-of-two bucket), ascending by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    frequencies: BTreeMap<u64, usize>,
}

impl Histogram {
    /// Count the allocations of `heap`. Deallocations are ignored.
    pub fn build(heap: &TrackedHeap, use_buckets: bool) -> Self {
        let mut frequencies = BTreeMap::new();
        for operation in heap.operations().iter().filter(|op| op.is_alloc()) {
            let key = if use_buckets {
                pow2_bucket(operation.size)
            } else {
                operation.size
            };
            *frequencies.entry(key).or_insert(0) += 1;
        }
        Self { frequencies }
    }

    /// Counts keyed by size or bucket.
    pub fn frequencies(&self) -> &BTreeMap<u64, usize> {
        &self.frequencies
    }

    /// Count for `key`, 0 if absent.
    pub fn get(&self, key: u64) -> usize {
        self.frequencies.get(&key).copied().unwrap_or(0)
    }

    /// True when the heap held no allocations.
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(alloc size:frequency):")?;
        for (key, count) in &self.frequencies {
            writeln!(f, "{key:>10}\t{count}")?;
        }
        Ok(())
    }
}
