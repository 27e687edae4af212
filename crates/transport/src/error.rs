//! Transport Error Types
//!
//! Two families: fetching bytes from an origin, and turning downloaded bytes
//! into a content directory. Callers above this crate map them onto
//! `FetchFailed` and `ExpandFailed` respectively, see [`ErrorKind::is_fetch`].

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A transport error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No transport is registered for the URL's scheme.
    #[display("unsupported url scheme: {_0}")]
    UnsupportedScheme(#[error(not(source))] String),
    /// Connection, TLS or body streaming failure.
    #[display("network error fetching {_0}")]
    Network(#[error(not(source))] String),
    /// The origin answered, but not with the content.
    #[display("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[display("nothing to fetch at {_0}")]
    NotFound(#[error(not(source))] String),
    /// Writing the download to disk failed.
    #[display("I/O error")]
    Io,
    /// The downloaded archive is corrupt or unreadable.
    #[display("invalid archive: {}", _0.display())]
    Archive(#[error(not(source))] PathBuf),
    /// An archive entry would land outside the expansion directory.
    #[display("archive entry escapes target directory: {_0}")]
    UnsafeEntry(#[error(not(source))] String),
    #[display("cannot parse launch arguments: {_0}")]
    LaunchArgs(#[error(not(source))] String),
    /// The self-extracting executable could not be started.
    #[display("failed to launch {}", _0.display())]
    Launch(#[error(not(source))] PathBuf),
    #[display("self-extractor exited with {code:?}: {stderr}")]
    LaunchExited { code: Option<i32>, stderr: String },
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io | Self::Task => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this failure happened while getting bytes from the origin,
    /// as opposed to while expanding them.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedScheme(_) | Self::Network(_) | Self::Status { .. } | Self::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network("u".into()), true)]
    #[case(ErrorKind::Status { url: "u".into(), status: 503 }, true)]
    #[case(ErrorKind::Status { url: "u".into(), status: 404 }, false)]
    #[case(ErrorKind::Archive(PathBuf::from("a.zip")), false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display() {
        let kind = ErrorKind::Status { url: "https://example.com/a".into(), status: 404 };
        assert_eq!(kind.to_string(), "https://example.com/a responded with HTTP 404");
    }
}
