//! Placing cached content into the working tree.
//!
//! Files are hard linked to their cache slot when the cache and the working
//! tree share a volume and copied otherwise. Directory content is mirrored
//! file by file, so every file in an expanded archive is its own link.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lfx_cache::CacheEntry;
use lfx_storage::{LinkCapability, LinkHandle, tree};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// How the files under one alias were placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliasStats {
    pub linked: u64,
    pub copied: u64,
    /// Already pointed at the cached bytes.
    pub unchanged: u64,
    /// Files present at the target but not in the content, now removed.
    pub pruned: u64,
}

/// Make `target` present the content of `entry`.
///
/// Idempotent: aliasing the same entry twice changes nothing the second time.
/// Whatever was at `target` before is replaced, a file by a directory or the
/// other way around if need be. Files are swapped in by rename, so a reader
/// of `target` never sees a half-written file.
#[instrument(level = "debug", skip(entry, target, links), fields(hash = %entry.hash, target = %target.display()))]
pub async fn alias(entry: &CacheEntry, target: &Path, links: &LinkHandle) -> Result<AliasStats> {
    let source = entry.path.clone();
    let target_owned = target.to_path_buf();
    let links = links.clone();
    let stats = tokio::task::spawn_blocking(move || alias_blocking(&source, &target_owned, &links))
        .await
        .or_raise(|| ErrorKind::AliasFailed(target.to_path_buf()))??;
    tracing::debug!(?stats, "Aliased content");
    Ok(stats)
}

fn alias_blocking(source: &Path, target: &Path, links: &LinkHandle) -> Result<AliasStats> {
    let failed = || ErrorKind::AliasFailed(target.to_path_buf());
    let mut stats = AliasStats::default();
    let source_is_dir = fs::metadata(source).or_raise(failed)?.is_dir();
    let existing = fs::symlink_metadata(target).ok();

    if !source_is_dir {
        if existing.is_some_and(|m| m.is_dir()) {
            tree::remove(target).or_raise(failed)?;
        }
        place(source, target, links, &mut stats).or_raise(failed)?;
        return Ok(stats);
    }

    if existing.is_some_and(|m| !m.is_dir()) {
        tree::remove(target).or_raise(failed)?;
    }
    fs::create_dir_all(target).or_raise(failed)?;
    let wanted = tree::files(source).or_raise(failed)?;
    for relative in &wanted {
        clear_way(target, relative).or_raise(failed)?;
        place(&source.join(relative), &target.join(relative), links, &mut stats).or_raise(failed)?;
    }
    let wanted: HashSet<PathBuf> = wanted.into_iter().collect();
    for relative in tree::files(target).or_raise(failed)? {
        if !wanted.contains(&relative) {
            fs::remove_file(target.join(&relative)).or_raise(failed)?;
            stats.pruned += 1;
        }
    }
    if stats.pruned > 0 {
        remove_empty_dirs(target).or_raise(failed)?;
    }
    Ok(stats)
}

/// Remove whatever is in the way of the file `relative` below `root`: a
/// non-directory where a parent directory must go, or a directory where the
/// file itself must go.
fn clear_way(root: &Path, relative: &Path) -> io::Result<()> {
    let mut current = root.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        current.push(component);
        let Ok(metadata) = fs::symlink_metadata(&current) else {
            // Nothing deeper can exist either.
            break;
        };
        let is_leaf = components.peek().is_none();
        if is_leaf && metadata.is_dir() {
            fs::remove_dir_all(&current)?;
        } else if !is_leaf && !metadata.is_dir() {
            fs::remove_file(&current)?;
            break;
        }
    }
    Ok(())
}

/// Remove directories below `dir` that hold no files. Returns whether `dir`
/// itself ended up empty.
fn remove_empty_dirs(dir: &Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && remove_empty_dirs(&entry.path())? {
            fs::remove_dir(entry.path())?;
        } else {
            empty = false;
        }
    }
    Ok(empty)
}

/// Put one file in place: link if possible, copy if not.
fn place(source: &Path, target: &Path, links: &LinkHandle, stats: &mut AliasStats) -> io::Result<()> {
    if links.same_file(source, target).unwrap_or(false) {
        stats.unchanged += 1;
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(target);
    // Left over from an interrupted run.
    if fs::symlink_metadata(&staging).is_ok() {
        fs::remove_file(&staging)?;
    }
    match links.create_hard_link(source, &staging) {
        Ok(()) => stats.linked += 1,
        Err(err) => {
            tracing::debug!(error = %err, source = %source.display(), "Hard link unavailable, copying");
            fs::copy(source, &staging)?;
            stats.copied += 1;
        },
    }
    if let Err(err) = fs::rename(&staging, target) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    Ok(())
}

/// Sibling of `target` used while placing it.
fn staging_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".lfx-staging");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lfx_pointer::{ContentHash, Info, Pointer};
    use lfx_storage::SystemLinks;
    use lfx_storage::links::FileId;
    use std::sync::Arc;

    fn entry(path: &Path) -> CacheEntry {
        let hash = ContentHash::of(path.as_os_str().as_encoded_bytes());
        let pointer = Pointer::file("https://example.com/a").unwrap();
        CacheEntry { hash, path: path.to_path_buf(), info: Info::resolved(&pointer, hash, 1, None) }
    }

    /// Refuses every hard link, as a cross-volume target would.
    struct NoLinks;
    impl LinkCapability for NoLinks {
        fn create_hard_link(&self, _existing: &Path, _new: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::CrossesDevices, "different volume"))
        }

        fn count_links(&self, path: &Path) -> io::Result<u64> {
            SystemLinks.count_links(path)
        }

        fn file_id(&self, path: &Path) -> io::Result<FileId> {
            SystemLinks.file_id(path)
        }
    }

    #[tokio::test]
    async fn test_file_is_linked_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("cache/content");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"bytes").unwrap();
        let links = SystemLinks::handle();

        let target = dir.path().join("tree/tools/a.bin");
        let first = alias(&entry(&cached), &target, &links).await.unwrap();
        assert_eq!(first.linked, 1);
        assert_eq!(fs::read(&target).unwrap(), b"bytes");
        assert!(links.count_links(&cached).unwrap() >= 2);

        let second = alias(&entry(&cached), &target, &links).await.unwrap();
        assert_eq!(second, AliasStats { unchanged: 1, ..AliasStats::default() });
        assert_eq!(links.count_links(&cached).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_many_aliases_share_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::write(&cached, b"shared").unwrap();
        let links = SystemLinks::handle();
        for name in ["one", "two", "three"] {
            alias(&entry(&cached), &dir.path().join(name), &links).await.unwrap();
        }
        assert_eq!(links.count_links(&cached).unwrap(), 4);
        let found = links.enumerate_links(&cached, dir.path()).unwrap();
        assert_eq!(found.len(), 4);
    }

    #[tokio::test]
    async fn test_overwrites_different_content() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::write(&cached, b"new").unwrap();
        let target = dir.path().join("target");
        fs::write(&target, b"old and longer").unwrap();

        alias(&entry(&cached), &target, &SystemLinks::handle()).await.unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!staging_path(&target).exists());
    }

    #[tokio::test]
    async fn test_falls_back_to_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::write(&cached, b"copied").unwrap();
        let target = dir.path().join("target");
        let links: LinkHandle = Arc::new(NoLinks);

        let stats = alias(&entry(&cached), &target, &links).await.unwrap();
        assert_eq!(stats.copied, 1);
        assert_eq!(fs::read(&target).unwrap(), b"copied");
        assert_eq!(links.count_links(&cached).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_directory_is_mirrored_and_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::create_dir_all(cached.join("bin")).unwrap();
        fs::write(cached.join("bin/tool"), b"tool").unwrap();
        fs::write(cached.join("README"), b"docs").unwrap();

        let target = dir.path().join("pkg");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale"), b"left over").unwrap();

        let links = SystemLinks::handle();
        let stats = alias(&entry(&cached), &target, &links).await.unwrap();
        assert_eq!(stats.linked, 2);
        assert_eq!(stats.pruned, 1);
        assert!(!target.join("stale").exists());
        assert!(links.same_file(&cached.join("bin/tool"), &target.join("bin/tool")).unwrap());
    }

    #[tokio::test]
    async fn test_directory_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::create_dir_all(&cached).unwrap();
        fs::write(cached.join("inner"), b"x").unwrap();
        let target = dir.path().join("pkg");
        fs::write(&target, b"was a file").unwrap();

        alias(&entry(&cached), &target, &SystemLinks::handle()).await.unwrap();
        assert!(target.is_dir());
        assert_eq!(fs::read(target.join("inner")).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_directory_entry_replaces_file_in_its_way() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::create_dir_all(cached.join("bin")).unwrap();
        fs::write(cached.join("bin/tool"), b"tool").unwrap();
        let target = dir.path().join("pkg");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("bin"), b"a file where a directory belongs").unwrap();

        alias(&entry(&cached), &target, &SystemLinks::handle()).await.unwrap();
        assert!(target.join("bin").is_dir());
        assert_eq!(fs::read(target.join("bin/tool")).unwrap(), b"tool");
    }

    #[tokio::test]
    async fn test_file_entry_replaces_directory_in_its_way() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::create_dir_all(&cached).unwrap();
        fs::write(cached.join("bin"), b"now a file").unwrap();
        let target = dir.path().join("pkg");
        fs::create_dir_all(target.join("bin")).unwrap();
        fs::write(target.join("bin/tool"), b"old").unwrap();

        let stats = alias(&entry(&cached), &target, &SystemLinks::handle()).await.unwrap();
        assert_eq!(stats.linked, 1);
        assert_eq!(fs::read(target.join("bin")).unwrap(), b"now a file");
    }

    #[tokio::test]
    async fn test_pruning_removes_emptied_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("content");
        fs::create_dir_all(&cached).unwrap();
        fs::write(cached.join("keep"), b"k").unwrap();
        let target = dir.path().join("pkg");
        fs::create_dir_all(target.join("old/nested")).unwrap();
        fs::write(target.join("old/nested/file"), b"stale").unwrap();

        let stats = alias(&entry(&cached), &target, &SystemLinks::handle()).await.unwrap();
        assert_eq!(stats.pruned, 1);
        assert!(!target.join("old").exists());
        assert!(target.join("keep").is_file());
    }
}
