use crate::Transport;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use lfx_asyncutils::InspectReader;
use lfx_progress::{ProgressHandle, ProgressKind};
use std::path::Path;
use tokio::fs::File;
use url::Url;

/// Copies `file://` URLs, for origins on a mounted share or local testing.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    fn supports(&self, url: &Url) -> bool {
        url.scheme() == "file"
    }

    async fn download(&self, url: &Url, target: &Path, progress: &ProgressHandle) -> Result<u64> {
        let Ok(source) = url.to_file_path() else {
            exn::bail!(ErrorKind::NotFound(url.to_string()));
        };
        let file = match File::open(&source).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(url.to_string())),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io),
        };
        let mut reader = InspectReader::new(file, |n| progress.report(ProgressKind::Download, n as u64));
        let mut out = File::create_new(target).await.or_raise(|| ErrorKind::Io)?;
        tokio::io::copy(&mut reader, &mut out).await.or_raise(|| ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lfx_progress::ProgressAggregator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_copies_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("origin.bin");
        std::fs::write(&source, vec![3u8; 5000]).unwrap();
        let url = Url::from_file_path(&source).unwrap();

        let progress = Arc::new(ProgressAggregator::new());
        let handle: ProgressHandle = progress.clone();
        let target = dir.path().join("download");
        let bytes = FileTransport.download(&url, &target, &handle).await.unwrap();
        assert_eq!(bytes, 5000);
        assert_eq!(std::fs::read(&target).unwrap().len(), 5000);
        assert_eq!(progress.snapshot().get(ProgressKind::Download).unwrap().progress, 5000);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing")).unwrap();
        let handle: ProgressHandle = Arc::new(ProgressAggregator::new());
        let err = FileTransport.download(&url, &dir.path().join("out"), &handle).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(err.is_fetch());
    }
}
