//! Info files in the working tree, one per tracked content path.
//!
//! The info directory mirrors the content directory: `<info>/a/b.zip`
//! describes the content at `<content>/a/b.zip`.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lfx_pointer::Info;
use lfx_storage::tree;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A parsed info file and the content path it governs.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub info_path: PathBuf,
    pub content_path: PathBuf,
    pub info: Info,
}

impl RepoInfo {
    /// Read the info file at `info_path`, which must lie inside `info_dir`.
    pub async fn load(info_dir: &Path, content_dir: &Path, info_path: &Path) -> Result<Self> {
        let relative = lfx_storage::relative_within(info_dir, info_path)
            .or_raise(|| ErrorKind::InvalidPointer(info_path.display().to_string()))?;
        let text = fs::read_to_string(info_path)
            .await
            .or_raise(|| ErrorKind::Storage(format!("cannot read {}", info_path.display())))?;
        let info: Info = text.parse::<Info>().or_raise(|| ErrorKind::InvalidPointer(info_path.display().to_string()))?;
        Ok(Self {
            info_path: info_path.to_path_buf(),
            content_path: content_dir.join(relative),
            info,
        })
    }

    /// Whether the record already carries the sizes learned by a previous
    /// resolution.
    pub fn has_metadata(&self) -> bool {
        self.info.size.is_some()
    }
}

/// Where the info file for `content_path` lives.
pub fn info_path_for(info_dir: &Path, content_dir: &Path, content_path: &Path) -> Result<PathBuf> {
    let relative = lfx_storage::relative_within(content_dir, content_path).or_raise(|| ErrorKind::OutsideContentDir {
        path: content_path.to_path_buf(),
        root: content_dir.to_path_buf(),
    })?;
    Ok(info_dir.join(relative))
}

/// Write `info` to `path`, creating parent directories as needed.
pub async fn write_info(path: &Path, info: &Info) -> Result<()> {
    let text = info.to_text().or_raise(|| ErrorKind::InvalidPointer(path.display().to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .or_raise(|| ErrorKind::Storage(format!("cannot create {}", parent.display())))?;
    }
    fs::write(path, text).await.or_raise(|| ErrorKind::Storage(format!("cannot write {}", path.display())))
}

/// Absolute paths of every info file, sorted. A missing info directory
/// holds no records.
pub async fn discover(info_dir: &Path) -> Result<Vec<PathBuf>> {
    if !fs::try_exists(info_dir).await.unwrap_or(false) {
        return Ok(Vec::new());
    }
    let root = info_dir.to_path_buf();
    let mut files = tokio::task::spawn_blocking(move || tree::files(&root))
        .await
        .or_raise(|| ErrorKind::Storage("directory walk was interrupted".to_string()))?
        .or_raise(|| ErrorKind::Storage(format!("cannot list {}", info_dir.display())))?;
    files.sort();
    Ok(files.into_iter().map(|relative| info_dir.join(relative)).collect())
}
