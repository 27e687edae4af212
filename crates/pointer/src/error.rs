//! Pointer Error Types
//!
//! Everything in this crate is pure, so every error here is an input error:
//! retrying the same input will fail the same way.

use derive_more::{Display, Error};

/// A pointer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pointer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ErrorKind {
    /// Not an absolute URL (no scheme, or a relative reference).
    #[display("invalid url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// Executable pointers need launch arguments to know where to expand to.
    #[display("exe pointer requires non-empty launch arguments")]
    MissingLaunchArgs,
    /// Only executable pointers carry launch arguments.
    #[display("launch arguments are only valid for exe pointers")]
    UnexpectedLaunchArgs,
    #[display("unknown pointer type: {_0}")]
    UnknownKind(#[error(not(source))] String),
    #[display("invalid content hash: {_0}")]
    InvalidHash(#[error(not(source))] String),
    /// The info file text could not be parsed.
    #[display("malformed info file (line {line}): {reason}")]
    Malformed { line: usize, reason: String },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
