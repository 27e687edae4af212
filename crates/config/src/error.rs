//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A settings source could not be parsed or holds a value of the wrong type.
    #[display("invalid configuration")]
    Invalid,
    /// Cache tiers are shared between processes, so their roots must not
    /// depend on where a command happens to run.
    #[display("{name} must be an absolute path, got {}", path.display())]
    RelativePath { name: &'static str, path: PathBuf },
    #[display("parallelism must be at least 1")]
    ZeroParallelism,
    /// No per-user cache directory could be determined and none was configured.
    #[display("no disk cache directory configured and no default available")]
    NoCacheDir,
    #[display("cannot determine the working directory")]
    WorkingDir,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
