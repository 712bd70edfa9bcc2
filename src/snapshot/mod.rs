//! Whole-heap snapshots on disk
//!
//! A snapshot file holds exactly one wire `Update` without a length prefix.
//! There is no version header; files are only readable by the same schema.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::heap::TrackedHeap;
use crate::wire::{self, WireError};

/// Errors raised while reading or writing snapshot files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Load was asked for a file that does not exist.
    #[error("snapshot file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// Any other filesystem failure.
    #[error("unable to access snapshot file {}", .path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file content is not a valid heap update.
    #[error("snapshot file {} is not a valid heap update", .path.display())]
    Decode {
        /// File being read.
        path: PathBuf,
        /// Decoding failure.
        #[source]
        source: WireError,
    },
}

fn io_error(path: &Path, source: io::Error) -> SnapshotError {
    if source.kind() == io::ErrorKind::NotFound {
        SnapshotError::FileNotFound(path.to_path_buf())
    } else {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a heap saved with [`save`].
pub fn load(path: impl AsRef<Path>) -> Result<TrackedHeap, SnapshotError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let heap = wire::decode(&bytes).map_err(|source| SnapshotError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), operations = heap.len(), "loaded snapshot");
    Ok(heap)
}

/// Write `heap` to `path`, replacing any existing file.
pub fn save(heap: &TrackedHeap, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    fs::write(path, wire::encode(heap)).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), operations = heap.len(), "saved snapshot");
    Ok(())
}
