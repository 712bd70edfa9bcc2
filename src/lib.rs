//! # memdb: heap operation trace analysis
//!
//! An instrumented process streams its allocations and deallocations to a
//! heap tracking server. This crate captures that stream into a
//! [`TrackedHeap`], an ordered log of operations with named markers, and
//! answers questions about it.
//!
//! ## Pipeline
//!
//! 1. **Capture**: poll the server socket, decode protobuf batches, stop at the
//!    sentinel allocation, then drop frees of memory allocated before capture
//! 2. **Address**: select intervals of the log with `from..to` range specs made
//!    of positions or marker names
//! 3. **Analyse**: diff two points of the log, bucket allocation sizes
//! 4. **Render**: plot heap usage over time or the address layout of a diff
//!
//! ## Usage Example
//!
//! ```ignore
//! use memdb::{diff, snapshot, plot::{self, PlotDimensions, Theme}};
//!
//! let heap = snapshot::load("trace.memdb")?;
//! let diff = diff::compute(&heap, "begin..end")?;
//! println!("{diff}");
//! println!("{}", plot::plot_layout(&diff, PlotDimensions::layout(), Theme::plain())?);
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod capture;   // Socket polling and stream assembly
pub mod diff;      // Alloc/dealloc reconciliation
pub mod heap;      // Operation log, markers and builder
pub mod histogram; // Allocation size buckets
pub mod plot;      // Usage and layout plots
pub mod range;     // Range specs and marker addressing
pub mod session;   // Verb hooks and interactive mode
pub mod snapshot;  // Load/save of whole logs
pub mod wire;      // Protobuf schema

pub use capture::{CaptureClient, CaptureConfig, CaptureError, Framing};
pub use diff::Diff;
pub use heap::{BuildError, HeapOperation, Marker, OperationKind, TrackedHeap, TrackedHeapBuilder};
pub use histogram::Histogram;
pub use plot::{PlotDimensions, PlotError, Theme};
pub use range::{Range, RangeError};
pub use session::{Session, SessionError};
pub use snapshot::SnapshotError;
pub use wire::WireError;

use thiserror::Error;

/// Any error raised by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-bounds range spec
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Invalid heap construction
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Undecodable wire message
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Capture failed
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Snapshot could not be read or written
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Plot could not be rendered
    #[error(transparent)]
    Plot(#[from] PlotError),

    /// Verb could not be executed
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_errors_convert() {
        let err: Error = RangeError::MalformedRangeSpec {
            spec: "0..".to_string(),
            reason: "invalid to-position".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "invalid range spec 0..: invalid to-position");

        let err: Error = PlotError::TooFewColumns(2).into();
        assert!(matches!(err, Error::Plot(_)));
    }
}
