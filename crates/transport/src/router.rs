use crate::error::{ErrorKind, Result};
use crate::{FileTransport, HttpTransport, Transport, TransportHandle};
use async_trait::async_trait;
use lfx_progress::ProgressHandle;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Dispatches each URL to the first registered transport that supports its
/// scheme.
#[derive(Clone, Default)]
pub struct Transports {
    transports: Vec<TransportHandle>,
}

impl Transports {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP(S) and `file://`.
    pub fn standard() -> Result<Self> {
        Ok(Self::new().with(Arc::new(HttpTransport::new()?)).with(Arc::new(FileTransport)))
    }

    pub fn with(mut self, transport: TransportHandle) -> Self {
        self.transports.push(transport);
        self
    }

    fn route(&self, url: &Url) -> Option<&TransportHandle> {
        self.transports.iter().find(|t| t.supports(url))
    }
}

#[async_trait]
impl Transport for Transports {
    fn name(&self) -> &str {
        "router"
    }

    fn supports(&self, url: &Url) -> bool {
        self.route(url).is_some()
    }

    async fn download(&self, url: &Url, target: &Path, progress: &ProgressHandle) -> Result<u64> {
        let Some(transport) = self.route(url) else {
            exn::bail!(ErrorKind::UnsupportedScheme(url.scheme().to_string()));
        };
        tracing::debug!(transport = transport.name(), %url, "Routing download");
        transport.download(url, target, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lfx_progress::NoProgress;

    #[tokio::test]
    async fn test_unknown_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let router = Transports::new().with(Arc::new(FileTransport));
        let url = Url::parse("ftp://example.com/a.bin").unwrap();
        assert!(!router.supports(&url));
        let err = router.download(&url, &dir.path().join("x"), &NoProgress::handle()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedScheme("ftp".to_string()));
    }

    #[test]
    fn test_standard_routes() {
        let router = Transports::standard().unwrap();
        assert!(router.supports(&Url::parse("https://example.com/a").unwrap()));
        assert!(router.supports(&Url::parse("http://example.com/a").unwrap()));
        assert!(router.supports(&Url::parse("file:///tmp/a").unwrap()));
        assert!(!router.supports(&Url::parse("s3://bucket/a").unwrap()));
    }
}
