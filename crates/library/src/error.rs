//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every command surfaces one of these kinds. Failures from the cache crate
//! are re-raised under the matching kind so callers never need to look two
//! crates down to find out what went wrong.

use derive_more::{Display, Error};
use exn::Frame;
use lfx_cache::error::{Error as CacheError, ErrorKind as CacheErrorKind};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, from the point of view of someone running a command.
///
/// ### Input Errors
/// - [`ErrorKind::InvalidPointer`]
/// - [`ErrorKind::OutsideContentDir`]
/// - [`ErrorKind::ClearRequiresForce`]
///
/// ### Content Errors
/// - [`ErrorKind::FetchFailed`]
/// - [`ErrorKind::ExpandFailed`]
/// - [`ErrorKind::AliasFailed`]
///
/// ### Environment Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Config`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A pointer or info file could not be understood. Never retried.
    #[display("invalid pointer: {_0}")]
    InvalidPointer(#[error(not(source))] String),
    #[display("fetch of {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },
    #[display("expansion of {url} failed: {reason}")]
    ExpandFailed { url: String, reason: String },
    /// Content could not be linked or copied into place.
    #[display("cannot place content at {}", _0.display())]
    AliasFailed(#[error(not(source))] PathBuf),
    /// Pulls must land inside the content directory.
    #[display("expected {} to be inside {}", path.display(), root.display())]
    OutsideContentDir { path: PathBuf, root: PathBuf },
    #[display("--clear must be combined with --force")]
    ClearRequiresForce,
    /// A cache tier, info file or directory could not be read or written.
    #[display("storage failure: {_0}")]
    Storage(#[error(not(source))] String),
    #[display("invalid configuration")]
    Config,
}

impl ErrorKind {
    /// Convert a cache error into a library error, keeping the cache crate's
    /// `Exn` frame as a child in the tree.
    #[track_caller]
    pub fn cache(err: CacheError) -> Error {
        let kind = match &*err {
            CacheErrorKind::InvalidPointer(reason) => Self::InvalidPointer(reason.clone()),
            CacheErrorKind::FetchFailed { url, reason } => Self::FetchFailed { url: url.clone(), reason: reason.clone() },
            CacheErrorKind::ExpandFailed { url, reason } => Self::ExpandFailed { url: url.clone(), reason: reason.clone() },
            other @ (CacheErrorKind::CacheCorruption { .. } | CacheErrorKind::Storage { .. }) => {
                Self::Storage(other.to_string())
            },
        };
        err.raise(kind)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::Storage(_))
    }
}

/// The innermost message on every branch of `err`'s tree. A leaf frame is
/// the failure that started it all, typically an I/O or network error.
pub fn root_causes(err: &Error) -> Vec<String> {
    fn walk(frame: &Frame, out: &mut Vec<String>) {
        match frame.children() {
            [] => out.push(frame.to_string()),
            children => children.iter().for_each(|child| walk(child, out)),
        }
    }
    let mut out = Vec::new();
    walk(err.frame(), &mut out);
    out
}
