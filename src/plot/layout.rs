//! Address-space map of a diff
//!
//! The address span touched by a diff is split into `rows * columns` equally
//! sized cells. A cell shows the sequence number of the added (or otherwise
//! removed) allocation overlapping it, or a dot when it is untouched.

use std::collections::BTreeMap;

use super::{PlotDimensions, PlotError, Theme, NO_DIFF};
use crate::diff::Diff;
use crate::heap::HeapOperation;

const CELL_WIDTH: usize = 8;

/// Operations grouped by address, walked in address order.
///
/// Cells are visited in ascending address order, so a group that ends before
/// the current cell can never match again and is skipped for good.
struct AddressCursor<'a> {
    groups: Vec<(u64, Vec<&'a HeapOperation>)>,
    next: usize,
}

impl<'a> AddressCursor<'a> {
    fn new(operations: &'a [HeapOperation]) -> Self {
        Self {
            groups: group_by_address(operations).into_iter().collect(),
            next: 0,
        }
    }

    fn current(&self) -> Option<&'a HeapOperation> {
        self.groups.get(self.next).map(|(_, ops)| ops[0])
    }

    /// First operation of the current group if it overlaps `[start, start + span)`.
    fn hit(&mut self, start: u128, span: u128) -> Option<&'a HeapOperation> {
        while let Some(operation) = self.current() {
            if u128::from(operation.end_address()) > start {
                break;
            }
            self.next += 1;
        }
        self.current()
            .filter(|operation| u128::from(operation.address) < start + span)
    }
}

fn group_by_address(operations: &[HeapOperation]) -> BTreeMap<u64, Vec<&HeapOperation>> {
    let mut groups: BTreeMap<u64, Vec<&HeapOperation>> = BTreeMap::new();
    for operation in operations {
        groups.entry(operation.address).or_default().push(operation);
    }
    groups
}

fn ceil_to_multiple(value: u128, multiple: u128) -> u128 {
    value.div_ceil(multiple) * multiple
}

/// Address interval covered by the plot: lowest touched address up to the end
/// of the highest one, rounded up to a multiple of the cell count.
fn address_bounds(diff: &Diff, cells: u128) -> Option<(u128, u128)> {
    let all = diff.added().iter().chain(diff.removed());
    let min = all.clone().map(|op| op.address).min()?;
    let top = all.fold(None, |top: Option<&HeapOperation>, op| match top {
        Some(current) if current.address >= op.address => Some(current),
        _ => Some(op),
    })?;
    let last = u128::from(top.address) + u128::from(top.size);
    Some((u128::from(min), ceil_to_multiple(last, cells)))
}

/// Plot which address cells were allocated or freed by `diff`.
///
/// Exactly `dimensions.rows` rows are printed, each prefixed with its start
/// address in hex. Added allocations win over removed ones sharing a cell.
pub fn plot_layout(
    diff: &Diff,
    dimensions: PlotDimensions,
    theme: Theme,
) -> Result<String, PlotError> {
    dimensions.validate()?;
    let PlotDimensions { columns, rows } = dimensions;
    if rows == 0 {
        return Ok(String::new());
    }

    let cells = rows as u128 * columns as u128;
    let Some((min, max)) = address_bounds(diff, cells) else {
        return Ok(NO_DIFF.to_string());
    };
    let cell_span = max.saturating_sub(min).div_ceil(cells).max(1);
    let row_span = cell_span * columns as u128;

    let mut added = AddressCursor::new(diff.added());
    let mut removed = AddressCursor::new(diff.removed());
    let mut out = String::new();

    for row in 0..rows as u128 {
        let row_start = min + row * row_span;
        out.push_str(&format!("{row_start:x}: "));
        for column in 0..columns as u128 {
            let cell_start = row_start + column * cell_span;
            if let Some(operation) = added.hit(cell_start, cell_span) {
                let cell = format!("{:>width$}+", operation.seq_no, width = CELL_WIDTH - 1);
                out.push_str(&theme.added(&cell));
            } else if let Some(operation) = removed.hit(cell_start, cell_span) {
                let cell = format!("{:>width$}-", operation.seq_no, width = CELL_WIDTH - 1);
                out.push_str(&theme.removed(&cell));
            } else {
                out.push_str(&" ".repeat(CELL_WIDTH - 1));
                out.push('.');
            }
        }
        out.push('\n');
    }
    Ok(out)
}
