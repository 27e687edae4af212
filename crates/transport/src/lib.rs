//! Getting content from where a pointer says it lives.
//!
//! A [`Transport`] downloads a URL to a local file; [`expand`] turns archive
//! and self-extracting payloads into directories. Both report byte progress.

pub mod error;
pub mod expand;
mod file;
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod router;

pub use crate::file::FileTransport;
pub use crate::http::HttpTransport;
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::{MockTransport, zip_bytes};
pub use crate::router::Transports;
use crate::error::Result;
use async_trait::async_trait;
use lfx_progress::ProgressHandle;
use std::path::Path;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Name used for logging.
    fn name(&self) -> &str;

    fn supports(&self, url: &Url) -> bool;

    /// Download `url` into the file `target`, which must not exist yet,
    /// reporting [`Download`](lfx_progress::ProgressKind::Download) bytes as
    /// they arrive. Returns the number of bytes written.
    async fn download(&self, url: &Url, target: &Path, progress: &ProgressHandle) -> Result<u64>;
}

pub type TransportHandle = Arc<dyn Transport>;
