use crate::Transport;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use lfx_progress::{ProgressHandle, ProgressKind};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use url::Url;

/// Downloads over `http` and `https`, streaming the body straight to disk.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("git-lfx/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network("failed to build HTTP client".to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn supports(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    #[instrument(level = "debug", skip(self, target, progress), fields(%url))]
    async fn download(&self, url: &Url, target: &Path, progress: &ProgressHandle) -> Result<u64> {
        let response =
            self.client.get(url.clone()).send().await.or_raise(|| ErrorKind::Network(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status { url: url.to_string(), status: status.as_u16() });
        }

        let mut file = File::create_new(target).await.or_raise(|| ErrorKind::Io)?;
        let mut body = std::pin::pin!(response.bytes_stream());
        let mut total = 0u64;
        while let Some(chunk) = body.try_next().await.or_raise(|| ErrorKind::Network(url.to_string()))? {
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Io)?;
            let len = chunk.len() as u64;
            total += len;
            progress.report(ProgressKind::Download, len);
        }
        file.flush().await.or_raise(|| ErrorKind::Io)?;
        tracing::debug!(%url, bytes = total, "Downloaded");
        Ok(total)
    }
}
