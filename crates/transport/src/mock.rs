//! In-memory transport for tests.

use crate::Transport;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use lfx_progress::{ProgressHandle, ProgressKind};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Serves registered URLs from memory and counts every download, so tests
/// can assert how often the network would have been hit.
#[derive(Debug, Default)]
pub struct MockTransport {
    files: Mutex<HashMap<Url, Vec<u8>>>,
    total: AtomicUsize,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register content at `url`.
    pub fn with(self, url: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(url, data);
        self
    }

    /// Delay every download, widening race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&self, url: &str, data: impl Into<Vec<u8>>) {
        let url = Url::parse(url).expect("mock urls must be absolute");
        self.files.lock().expect("mock lock poisoned").insert(url, data.into());
    }

    /// Downloads attempted across all URLs, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, _url: &Url) -> bool {
        true
    }

    async fn download(&self, url: &Url, target: &Path, progress: &ProgressHandle) -> Result<u64> {
        self.total.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let data = self.files.lock().expect("mock lock poisoned").get(url).cloned();
        let Some(data) = data else {
            exn::bail!(ErrorKind::NotFound(url.to_string()));
        };
        tokio::fs::write(target, &data).await.or_raise(|| ErrorKind::Io)?;
        progress.report(ProgressKind::Download, data.len() as u64);
        Ok(data.len() as u64)
    }
}

/// Build an in-memory zip archive with stored (uncompressed) entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = ::zip::write::SimpleFileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).expect("zip entry");
        writer.write_all(data).expect("zip write");
    }
    writer.finish().expect("zip finish").into_inner()
}
