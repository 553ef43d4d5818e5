//! Core error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! transparent variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested or clipped region is degenerate (min > max, NaN, or
    /// nothing left after clipping).
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
