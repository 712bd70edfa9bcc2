//! Terminal renderings of a tracked heap
//!
//! Two grid plots are provided: heap usage over time ([`usage`]) and an
//! address-space map of a diff ([`layout`]). Both return plain strings; colour
//! is applied through a [`Theme`] so output can be piped without escape codes.

pub mod layout;
pub mod usage;

pub use layout::plot_layout;
pub use usage::plot_usage;

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use thiserror::Error;

/// Smallest number of bar columns a plot accepts.
pub const MIN_COLUMNS: usize = 8;

/// Default usage plot width in bar characters.
pub const DEFAULT_USAGE_COLUMNS: usize = 100;

/// Default layout plot width in cells.
pub const DEFAULT_LAYOUT_COLUMNS: usize = 15;

/// Default number of plot rows.
pub const DEFAULT_ROWS: usize = 40;

/// Returned instead of a plot when there is nothing to draw.
pub const NO_HEAP_OPERATIONS: &str = "<no heap operations>";

/// Returned instead of a diff or layout plot when nothing changed.
pub const NO_DIFF: &str = "<no diff>";

/// Errors produced by the renderers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlotError {
    /// Fewer than [`MIN_COLUMNS`] columns were requested.
    #[error("plot needs at least 8 columns, got {0}")]
    TooFewColumns(usize),
}

/// Size of a plot grid.
///
/// For usage plots `columns` is the maximum bar length and `rows` an upper
/// bound on printed operation rows. For layout plots they give the cell grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotDimensions {
    /// Bar length or cells per row.
    pub columns: usize,
    /// Row limit or number of rows.
    pub rows: usize,
}

impl PlotDimensions {
    /// Explicit grid size.
    pub fn new(columns: usize, rows: usize) -> Self {
        Self { columns, rows }
    }

    /// Defaults for [`plot_usage`].
    pub fn usage() -> Self {
        Self::new(DEFAULT_USAGE_COLUMNS, DEFAULT_ROWS)
    }

    /// Defaults for [`plot_layout`].
    pub fn layout() -> Self {
        Self::new(DEFAULT_LAYOUT_COLUMNS, DEFAULT_ROWS)
    }

    /// Replace the column count.
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns;
        self
    }

    /// Replace the row count.
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), PlotError> {
        if self.columns < MIN_COLUMNS {
            return Err(PlotError::TooFewColumns(self.columns));
        }
        Ok(())
    }
}

/// Highlighting for growth and shrinkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    colored: bool,
}

impl Theme {
    /// ANSI green for additions, red for removals.
    pub fn colored() -> Self {
        Self { colored: true }
    }

    /// No escape codes.
    pub fn plain() -> Self {
        Self { colored: false }
    }

    /// Colored when stdout is a terminal.
    pub fn for_stdout() -> Self {
        Self {
            colored: std::io::stdout().is_terminal(),
        }
    }

    /// Highlight text describing allocated memory.
    pub fn added(&self, text: &str) -> String {
        if self.colored {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }

    /// Highlight text describing released memory.
    pub fn removed(&self, text: &str) -> String {
        if self.colored {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::plain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_theme_leaves_text_alone() {
        let theme = Theme::plain();
        assert_eq!(theme.added("+++"), "+++");
        assert_eq!(theme.removed("---"), "---");
    }

    #[test]
    fn colored_theme_wraps_text() {
        let theme = Theme::colored();
        let added = theme.added("+");
        assert!(added.starts_with("\u{1b}[32m"));
        assert!(added.contains('+'));
        assert!(theme.removed("-").starts_with("\u{1b}[31m"));
    }

    #[test]
    fn narrow_plots_are_rejected() {
        assert_eq!(
            PlotDimensions::new(7, 10).validate(),
            Err(PlotError::TooFewColumns(7))
        );
        assert!(PlotDimensions::new(MIN_COLUMNS, 0).validate().is_ok());
    }
}
