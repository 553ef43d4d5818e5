//! Spatial-subsystem error type.

use std::path::PathBuf;

use thiserror::Error;

use st_core::{CoreError, Point, SegmentId};

/// Errors produced by `st-spatial`.
///
/// `Io`, `Corrupt` and `Core(InvalidRegion)` are startup failures: the map
/// cannot be used.  `NoRoute` is a local, recoverable routing failure.
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt {file} file: {detail}")]
    Corrupt { file: &'static str, detail: String },

    #[error("segment {start} -> {end} is shorter than the resolution tolerance")]
    DegenerateSegment { start: Point, end: Point },

    #[error("no route from {from} to {to}")]
    NoRoute { from: SegmentId, to: SegmentId },

    #[error("segment {0} not found in network")]
    SegmentNotFound(SegmentId),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SpatialResult<T> = Result<T, SpatialError>;

/// Adapter for `map_err` that attaches the offending path to an I/O error.
pub(crate) fn io_err(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> SpatialError + '_ {
    move |source| SpatialError::Io { path: path.to_path_buf(), source }
}
