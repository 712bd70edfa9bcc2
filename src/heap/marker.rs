//! Named positions in a tracked heap

use std::fmt;

/// A named location in the log.
///
/// The marker sits in the gap just before the operation with
/// `first_operation_seq_no`. A marker sent after the last operation points one
/// past the end of the log. Several markers may share a name; `index` tells
/// them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker {
    /// Marker name as sent by the instrumented process.
    pub name: String,
    /// Disambiguates markers with the same name.
    pub index: u64,
    /// Sequence number of the operation right after the marker.
    pub first_operation_seq_no: u64,
}

impl Marker {
    /// Marker with index 0.
    pub fn new(name: impl Into<String>, first_operation_seq_no: u64) -> Self {
        Self::indexed(name, 0, first_operation_seq_no)
    }

    /// Marker with an explicit index.
    pub fn indexed(name: impl Into<String>, index: u64, first_operation_seq_no: u64) -> Self {
        Self {
            name: name.into(),
            index,
            first_operation_seq_no,
        }
    }

    /// `name`, or `name:index` when the index is non-zero. This is the form
    /// accepted by range specs.
    pub fn label(&self) -> String {
        if self.index == 0 {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.index)
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "marker[name: {}, index: {}, seq-no: {}]",
            self.name, self.index, self.first_operation_seq_no
        )
    }
}
