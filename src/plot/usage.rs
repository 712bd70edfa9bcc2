//! Heap usage over time
//!
//! Each printed row shows the live heap size before and after one operation as
//! a horizontal bar scaled to the largest size reached in the range. Markers are
//! drawn as dashed lines between the rows they separate.

use super::{PlotDimensions, PlotError, Theme};
use crate::heap::{Marker, TrackedHeap};
use crate::range::Range;

const LABEL_WIDTH: usize = 16;

/// Live heap size around one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SizeChange {
    before: u64,
    after: u64,
}

/// Running heap size for every operation of `heap`. Shrinking below zero
/// saturates, which only happens for logs that still hold unmatched frees.
fn size_changes(heap: &TrackedHeap) -> Vec<SizeChange> {
    let mut current: u64 = 0;
    heap.operations()
        .iter()
        .map(|operation| {
            let before = current;
            current = if operation.is_alloc() {
                current.saturating_add(operation.size)
            } else {
                current.saturating_sub(operation.size)
            };
            SizeChange {
                before,
                after: current,
            }
        })
        .collect()
}

fn scaled(size: u64, columns: usize, max_heap_size: u64) -> usize {
    if max_heap_size == 0 {
        return 0;
    }
    let cells = (u128::from(size) * columns as u128).div_ceil(u128::from(max_heap_size));
    cells as usize
}

fn heading(columns: usize, max_heap_size: u64) -> String {
    format!(
        "{:>LABEL_WIDTH$}->{}<-{max_heap_size}",
        "allocated",
        " ".repeat(columns)
    )
}

fn marker_line(marker: &Marker, columns: usize) -> String {
    format!("{:>LABEL_WIDTH$}: {}", marker.label(), "-".repeat(columns))
}

fn bar(change: SizeChange, columns: usize, max_heap_size: u64, theme: Theme) -> String {
    let before = scaled(change.before, columns, max_heap_size);
    let after = scaled(change.after, columns, max_heap_size);
    let mut bar = "#".repeat(before.min(after));
    if after > before {
        bar.push_str(&theme.added(&"+".repeat(after - before)));
    } else if before > after {
        bar.push_str(&theme.removed(&"-".repeat(before - after)));
    }
    bar
}

/// Plot the live heap size over `range`.
///
/// At most `dimensions.rows` operation rows are printed; when the range is
/// longer, each row stands for a fixed number of operations and shows the
/// first of them. Markers of the skipped operations are still drawn. A
/// reversed range is plotted in ascending order.
pub fn plot_usage(
    range: &Range<'_>,
    dimensions: PlotDimensions,
    theme: Theme,
) -> Result<String, PlotError> {
    dimensions.validate()?;

    let heap = range.heap();
    let (lo, hi) = range.ascending();
    let changes = size_changes(heap);
    let max_heap_size = changes[lo..=hi]
        .iter()
        .map(|change| change.after)
        .max()
        .unwrap_or(0);
    let columns = dimensions.columns;

    let mut lines = vec![heading(columns, max_heap_size)];
    let operation_count = range.len();
    let printed_rows = operation_count.min(dimensions.rows);
    if printed_rows == 0 {
        return Ok(lines.join("\n") + "\n");
    }
    let operations_per_row = operation_count.div_ceil(printed_rows);

    for position in (lo..=hi).step_by(operations_per_row) {
        lines.extend(heap.markers_at(position).map(|m| marker_line(m, columns)));
        lines.push(format!(
            "{position:>LABEL_WIDTH$}: {}",
            bar(changes[position], columns, max_heap_size, theme)
        ));
        let last_skipped = (position + operations_per_row - 1).min(hi);
        for skipped in position + 1..=last_skipped {
            lines.extend(heap.markers_at(skipped).map(|m| marker_line(m, columns)));
        }
    }
    lines.extend(heap.markers_at(hi + 1).map(|m| marker_line(m, columns)));

    Ok(lines.join("\n") + "\n")
}
