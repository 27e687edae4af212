//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Kinds are `Clone`: one failed materialization is observed by every caller
//! that was waiting on it, and each of them gets its own copy.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pointer itself is unusable; fix the input.
    #[display("invalid pointer: {_0}")]
    InvalidPointer(#[error(not(source))] String),
    /// The origin could not deliver the content.
    #[display("fetch of {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },
    /// The content was downloaded but could not be expanded.
    #[display("expansion of {url} failed: {reason}")]
    ExpandFailed { url: String, reason: String },
    /// A cached entry does not hash to its name. Recovered from internally
    /// by treating the entry as missing.
    #[display("cache entry {hash} in tier `{tier}` is corrupt")]
    CacheCorruption { tier: String, hash: String },
    /// A cache tier could not be read or written.
    #[display("cache tier `{tier}` failed: {reason}")]
    Storage { tier: String, reason: String },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::Storage { .. })
    }
}
