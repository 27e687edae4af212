use crate::Context;
use crate::alias::alias;
use crate::error::{ErrorKind, Result};
use crate::repo_info::{info_path_for, write_info};
use lfx_cache::CacheEntry;
use lfx_pointer::Pointer;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Result of [`pull`].
#[derive(Debug, Clone)]
pub struct Pulled {
    pub entry: CacheEntry,
    pub content_path: PathBuf,
    pub info_path: PathBuf,
}

/// Materialize `pointer` into the cache and return its entry; its
/// [`info`](CacheEntry::info) is what a caller prints.
#[instrument(level = "debug", skip(ctx, pointer), fields(url = %pointer.url()))]
pub async fn fetch(ctx: &Context, pointer: &Pointer) -> Result<CacheEntry> {
    let entry = ctx.store.resolve(pointer).await.map_err(ErrorKind::cache)?;
    ctx.finish_progress();
    Ok(entry)
}

/// Fetch `pointer`, alias it at `path` and record it in the info directory.
///
/// `path` is resolved against `working_dir` and must land inside the content
/// directory. That is checked before anything is downloaded, so a bad path
/// costs nothing and writes nothing.
#[instrument(level = "debug", skip(ctx, working_dir, path, pointer), fields(path = %path.display(), url = %pointer.url()))]
pub async fn pull(ctx: &Context, working_dir: &Path, path: &Path, pointer: &Pointer) -> Result<Pulled> {
    let content_path = lfx_storage::absolutize(working_dir, path);
    let info_path = info_path_for(&ctx.info_dir, &ctx.content_dir, &content_path)?;

    let entry = ctx.store.resolve(pointer).await.map_err(ErrorKind::cache)?;
    alias(&entry, &content_path, &ctx.links).await?;
    write_info(&info_path, &entry.info).await?;
    ctx.finish_progress();
    tracing::info!(path = %content_path.display(), hash = %entry.hash, "Pulled content");
    Ok(Pulled { entry, content_path, info_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use lfx_pointer::Info;
    use lfx_progress::ProgressKind;
    use lfx_transport::{MockTransport, zip_bytes};
    use std::fs;

    #[tokio::test]
    async fn test_fetch_reports_info() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", vec![3u8; 100]));
        let ctx = fx.context_with_progress();
        let entry = fetch(&ctx, &Pointer::file("https://example.com/a.bin").unwrap()).await.unwrap();
        assert_eq!(entry.info.size, Some(100));
        let text = entry.info.to_text().unwrap();
        assert_eq!(text.parse::<Info>().unwrap(), entry.info);
        let progress = ctx.progress.as_ref().unwrap().snapshot();
        assert_eq!(progress.get(ProgressKind::Download).unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_pull_aliases_and_records() {
        let archive = zip_bytes(&[("bin/tool", &b"tool"[..])]);
        let fx = Fixture::new(MockTransport::new().with("https://example.com/pkg.zip", archive));
        let ctx = fx.context();
        let pointer = Pointer::zip("https://example.com/pkg.zip").unwrap();

        // Relative to a working directory inside the enlistment.
        let working_dir = fx.root().join("lfx/tools");
        let pulled = pull(&ctx, &working_dir, Path::new("../sdk/pkg"), &pointer).await.unwrap();
        assert_eq!(pulled.content_path, fx.root().join("lfx/sdk/pkg"));
        assert_eq!(pulled.info_path, fx.root().join(".lfx/sdk/pkg"));
        assert_eq!(fs::read(pulled.content_path.join("bin/tool")).unwrap(), b"tool");

        let recorded: Info = fs::read_to_string(&pulled.info_path).unwrap().parse().unwrap();
        assert_eq!(recorded, pulled.entry.info);
        assert_eq!(recorded.content_size, Some(4));
    }

    #[tokio::test]
    async fn test_pull_outside_content_dir_is_rejected_up_front() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", b"x".to_vec()));
        let ctx = fx.context();
        let pointer = Pointer::file("https://example.com/a.bin").unwrap();

        for path in ["elsewhere/a.bin", "lfx/../a.bin", "lfx"] {
            let err = pull(&ctx, fx.root(), Path::new(path), &pointer).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::OutsideContentDir { .. }), "{path}");
        }
        assert_eq!(fx.transport.fetch_count(), 0);
        assert!(!fx.root().join(".lfx").exists());
        assert!(!fx.root().join("elsewhere").exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_kind() {
        let fx = Fixture::new(MockTransport::new());
        let err = fetch(&fx.context(), &Pointer::file("https://example.com/missing").unwrap()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FetchFailed { .. }));
    }
}
