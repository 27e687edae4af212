//! Syncing the content directory with the info directory.
//!
//! Every info file is resolved and aliased into place, up to
//! [`Context::parallelism`] at a time. A record that fails leaves its content
//! path alone and does not stop the others; failures are collected and
//! reported together once the batch is done.

use crate::Context;
use crate::alias::{AliasStats, alias};
use crate::error::{Error, ErrorKind, Result};
use crate::repo_info::{RepoInfo, discover, write_info};
use async_stream::stream;
use futures::{Stream, StreamExt};
use lfx_pointer::ContentHash;
use lfx_progress::{ProgressAggregator, ProgressKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Progress events emitted by [`checkout_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once, with the
///    number of info files found.
/// 3. [`CheckedOut`](Self::CheckedOut) or [`Failed`](Self::Failed), once per
///    info file, in completion order.
/// 4. [`Complete`](Self::Complete), exactly once.
///
/// Only a failure to list the info directory ends the stream early, as an
/// `Err` item.
pub enum CheckoutEvent {
    Started,
    DiscoveryComplete(u64),
    CheckedOut(Box<CheckedOut>),
    Failed(Box<RecordFailure>),
    Complete,
}

#[derive(Debug, Clone)]
pub struct CheckedOut {
    pub info_path: PathBuf,
    pub content_path: PathBuf,
    pub hash: ContentHash,
    pub alias: AliasStats,
    /// The info file was updated with newly learned hash or sizes.
    pub info_rewritten: bool,
}

#[derive(Debug)]
pub struct RecordFailure {
    pub info_path: PathBuf,
    pub error: Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Default)]
pub struct CheckoutReport {
    pub checked_out: Vec<CheckedOut>,
    pub failures: Vec<RecordFailure>,
}

impl CheckoutReport {
    pub fn state(&self) -> CheckoutState {
        if self.failures.is_empty() { CheckoutState::Completed } else { CheckoutState::PartiallyFailed }
    }
}

/// Check out every tracked record and collect the outcome.
///
/// Progress, when enabled, is driven to 100% of every known total before
/// returning, whether or not records failed.
pub async fn checkout(ctx: &Context) -> Result<CheckoutReport> {
    let mut report = CheckoutReport::default();
    let events = checkout_stream(ctx);
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        match event {
            Ok(CheckoutEvent::CheckedOut(done)) => report.checked_out.push(*done),
            Ok(CheckoutEvent::Failed(failure)) => {
                tracing::warn!(path = %failure.info_path.display(), error = %*failure.error, "Checkout of record failed");
                report.failures.push(*failure);
            },
            Ok(_) => {},
            Err(err) => {
                ctx.finish_progress();
                return Err(err);
            },
        }
    }
    ctx.finish_progress();
    Ok(report)
}

/// Stream [`CheckoutEvent`]s while checking out every info file.
pub fn checkout_stream(ctx: &Context) -> impl Stream<Item = Result<CheckoutEvent>> + '_ {
    stream!({
        yield Ok(CheckoutEvent::Started);

        let paths = match discover(&ctx.info_dir).await {
            Ok(paths) => paths,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        yield Ok(CheckoutEvent::DiscoveryComplete(u64::try_from(paths.len()).unwrap_or(0)));

        let sizing = ctx.progress.clone().map(|progress| {
            let paths = paths.clone();
            let info_dir = ctx.info_dir.clone();
            let content_dir = ctx.content_dir.clone();
            tokio::spawn(async move { size_totals(&progress, &info_dir, &content_dir, &paths).await })
        });

        let mut records = futures::stream::iter(paths)
            .map(|path| async move {
                let result = checkout_record(ctx, &path).await;
                (path, result)
            })
            .buffer_unordered(ctx.parallelism.max(1));
        while let Some((info_path, result)) = records.next().await {
            yield Ok(match result {
                Ok(done) => CheckoutEvent::CheckedOut(Box::new(done)),
                Err(error) => CheckoutEvent::Failed(Box::new(RecordFailure { info_path, error })),
            });
        }

        if let Some(sizing) = sizing
            && let Err(err) = sizing.await
        {
            tracing::debug!(error = %err, "Sizing task did not finish");
        }
        yield Ok(CheckoutEvent::Complete);
    })
}

async fn checkout_record(ctx: &Context, info_path: &Path) -> Result<CheckedOut> {
    let record = RepoInfo::load(&ctx.info_dir, &ctx.content_dir, info_path).await?;
    let entry = ctx.store.resolve(&record.info.pointer).await.map_err(ErrorKind::cache)?;
    let stats = alias(&entry, &record.content_path, &ctx.links).await?;
    let info_rewritten = record.info != entry.info;
    if info_rewritten {
        write_info(&record.info_path, &entry.info).await?;
    }
    Ok(CheckedOut {
        info_path: record.info_path,
        content_path: record.content_path,
        hash: entry.hash,
        alias: stats,
        info_rewritten,
    })
}

/// Announce expected byte totals from records resolved by earlier runs.
/// Unreadable records are skipped; their failure is reported by checkout.
async fn size_totals(progress: &Arc<ProgressAggregator>, info_dir: &Path, content_dir: &Path, paths: &[PathBuf]) {
    let (mut download, mut expand) = (0, 0);
    for path in paths {
        let Ok(record) = RepoInfo::load(info_dir, content_dir, path).await else {
            continue;
        };
        if !record.has_metadata() {
            continue;
        }
        download += record.info.size.unwrap_or(0);
        expand += record.info.content_size.unwrap_or(0);
    }
    progress.add_total(ProgressKind::Download, download);
    progress.add_total(ProgressKind::Expand, expand);
}
