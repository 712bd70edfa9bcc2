//! Command hooks shared by the command line and the interactive mode
//!
//! A [`Session`] holds the current tracked heap and the last computed diff.
//! Every verb is one method returning the text to show the user.

pub mod interactive;

use thiserror::Error;
use tracing::info;

use crate::capture::{CaptureClient, CaptureConfig, CaptureError, DEFAULT_PORT};
use crate::diff::{self, Diff};
use crate::heap::TrackedHeap;
use crate::histogram::Histogram;
use crate::plot::{self, PlotDimensions, PlotError, Theme, NO_HEAP_OPERATIONS};
use crate::range::{Range, RangeError};
use crate::snapshot::{self, SnapshotError};

/// Errors reported by the verb hooks.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The verb needs a heap but none was captured or loaded.
    #[error("no tracked heap available")]
    NoTrackedHeap,

    /// `plot-layout` ran before any diff.
    #[error("no diff available")]
    NoDiff,

    /// `print` asked for an operation outside the heap.
    #[error("invalid heap operation sequence number {seq_no}, tracked heap size {len}")]
    InvalidSeqNo {
        /// Requested sequence number.
        seq_no: u64,
        /// Number of operations in the heap.
        len: usize,
    },

    /// The capture target is not `host[:port]`.
    #[error("invalid connection string {0}, expected host[:port]")]
    InvalidConnectionString(String),

    /// A required interactive argument is absent.
    #[error("expected argument {name} at position {position}")]
    MissingArgument {
        /// Argument name shown to the user.
        name: &'static str,
        /// Word position on the input line.
        position: usize,
    },

    /// An interactive argument is not an integer.
    #[error("expected integer argument {name} at position {position}")]
    InvalidInteger {
        /// Argument name shown to the user.
        name: &'static str,
        /// Word position on the input line.
        position: usize,
    },

    /// Bad range spec.
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Capture failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Snapshot load or save failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Plot could not be rendered.
    #[error(transparent)]
    Plot(#[from] PlotError),
}

/// Split `host[:port]`. An empty host means localhost.
pub fn parse_connection_string(connection: &str) -> Result<(String, u16), SessionError> {
    let (host, port) = match connection.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| SessionError::InvalidConnectionString(connection.to_string()))?;
            (host, port)
        }
        None => (connection, DEFAULT_PORT),
    };
    let host = if host.is_empty() { "localhost" } else { host };
    Ok((host.to_string(), port))
}

/// Current analysis state.
#[derive(Debug, Default)]
pub struct Session {
    heap: Option<TrackedHeap>,
    diff: Option<Diff>,
    capture: CaptureConfig,
    theme: Theme,
}

impl Session {
    /// Empty session capturing with `capture` and rendering with `theme`.
    pub fn new(capture: CaptureConfig, theme: Theme) -> Self {
        Self {
            heap: None,
            diff: None,
            capture,
            theme,
        }
    }

    /// Start from an existing heap.
    pub fn with_heap(mut self, heap: TrackedHeap) -> Self {
        self.heap = Some(heap);
        self
    }

    /// Current heap, if any.
    pub fn heap(&self) -> Option<&TrackedHeap> {
        self.heap.as_ref()
    }

    /// Last computed diff, if any.
    pub fn diff(&self) -> Option<&Diff> {
        self.diff.as_ref()
    }

    fn require_heap(&self) -> Result<&TrackedHeap, SessionError> {
        self.heap.as_ref().ok_or(SessionError::NoTrackedHeap)
    }

    fn replace_heap(&mut self, heap: TrackedHeap) {
        self.heap = Some(heap);
        self.diff = None;
    }

    /// Capture a new heap from `host[:port]`.
    pub fn capture(&mut self, connection: &str) -> Result<String, SessionError> {
        let (host, port) = parse_connection_string(connection)?;
        info!(%host, port, "capturing heap trace");
        let heap = CaptureClient::new(self.capture.clone()).capture(&host, port)?;
        let report = format!(
            "Captured {} heap operations and {} markers from {host}:{port}",
            heap.len(),
            heap.markers().len()
        );
        self.replace_heap(heap);
        Ok(report)
    }

    /// Replace the current heap with a snapshot.
    pub fn load(&mut self, path: &str) -> Result<String, SessionError> {
        let heap = snapshot::load(path)?;
        let report = format!("Loaded {} heap operations from {path}", heap.len());
        self.replace_heap(heap);
        Ok(report)
    }

    /// Write the current heap to `path`.
    pub fn save(&self, path: &str) -> Result<String, SessionError> {
        snapshot::save(self.require_heap()?, path)?;
        Ok(format!("Saved tracked heap to {path}"))
    }

    /// Compute and remember the diff for `spec`.
    pub fn diff_range(&mut self, spec: &str) -> Result<String, SessionError> {
        let diff = diff::compute(self.require_heap()?, spec)?;
        let report = format!("Diff:\n{}", diff.render(self.theme));
        self.diff = Some(diff);
        Ok(report)
    }

    /// Histogram of allocation sizes.
    pub fn histogram(&self, use_buckets: bool) -> Result<String, SessionError> {
        let histogram = Histogram::build(self.require_heap()?, use_buckets);
        Ok(format!("Histogram:\n{histogram}"))
    }

    /// Describe one operation, optionally with its backtrace.
    pub fn print(&self, seq_no: u64, show_backtrace: bool) -> Result<String, SessionError> {
        let heap = self.require_heap()?;
        let operation = usize::try_from(seq_no)
            .ok()
            .and_then(|position| heap.operation(position))
            .ok_or(SessionError::InvalidSeqNo {
                seq_no,
                len: heap.len(),
            })?;
        Ok(format!("Print:\n{}", operation.describe(show_backtrace)))
    }

    /// Usage plot over `range_spec`, the whole heap when absent.
    pub fn plot(
        &self,
        range_spec: Option<&str>,
        dimensions: PlotDimensions,
    ) -> Result<String, SessionError> {
        let heap = self.require_heap()?;
        if heap.is_empty() {
            return Ok(format!("Plot:\n{NO_HEAP_OPERATIONS}"));
        }
        let range = match range_spec {
            Some(spec) => Range::parse(heap, spec)?,
            None => Range::whole(heap)?,
        };
        let plot = plot::plot_usage(&range, dimensions, self.theme)?;
        Ok(format!("Plot:\n{plot}"))
    }

    /// Layout plot of the last computed diff.
    pub fn plot_layout(&self, dimensions: PlotDimensions) -> Result<String, SessionError> {
        let diff = self.diff.as_ref().ok_or(SessionError::NoDiff)?;
        let plot = plot::plot_layout(diff, dimensions, self.theme)?;
        Ok(format!("Layout plot:\n{plot}"))
    }

    /// Keep only the operations in `spec`.
    pub fn truncate(&mut self, spec: &str) -> Result<String, SessionError> {
        let heap = self.require_heap()?;
        let range = Range::parse(heap, spec)?;
        let (lo, hi) = range.ascending();
        let truncated = TrackedHeap::truncate(&range);
        let report = format!(
            "Truncated tracked heap to {lo}..{hi} ({} heap operations)",
            truncated.len()
        );
        self.replace_heap(truncated);
        Ok(report)
    }
}
