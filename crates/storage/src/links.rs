//! Hard link capability.
//!
//! Publishing cached content into a working tree relies on a handful of
//! primitives that differ per platform. They live behind [`LinkCapability`]
//! so the alias logic can be exercised against any implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies a file's backing data: the volume it lives on plus its index
/// (inode) on that volume. Two paths with equal ids are hard links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub volume: u64,
    pub index: u64,
}

pub trait LinkCapability: Send + Sync {
    /// Create `new` as another name for `existing`.
    fn create_hard_link(&self, existing: &Path, new: &Path) -> io::Result<()> {
        fs::hard_link(existing, new)
    }

    /// Number of names the file at `path` has.
    fn count_links(&self, path: &Path) -> io::Result<u64>;

    fn file_id(&self, path: &Path) -> io::Result<FileId>;

    fn same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        Ok(self.file_id(a)? == self.file_id(b)?)
    }

    /// Every path below `search_root` that names the same file as `path`.
    fn enumerate_links(&self, path: &Path, search_root: &Path) -> io::Result<Vec<PathBuf>> {
        let target = self.file_id(path)?;
        let mut found = Vec::new();
        let mut stack = vec![search_root.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in fs::read_dir(&current)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() && self.file_id(&entry.path())? == target {
                    found.push(entry.path());
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

pub type LinkHandle = Arc<dyn LinkCapability>;

/// Links using the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLinks;

impl SystemLinks {
    pub fn handle() -> LinkHandle {
        Arc::new(Self)
    }
}

#[cfg(unix)]
impl LinkCapability for SystemLinks {
    fn count_links(&self, path: &Path) -> io::Result<u64> {
        use std::os::unix::fs::MetadataExt;
        Ok(fs::metadata(path)?.nlink())
    }

    fn file_id(&self, path: &Path) -> io::Result<FileId> {
        use std::os::unix::fs::MetadataExt;
        let metadata = fs::metadata(path)?;
        Ok(FileId { volume: metadata.dev(), index: metadata.ino() })
    }
}

#[cfg(windows)]
mod windows {
    use super::FileId;
    use std::fs::File;
    use std::io;
    use std::os::windows::io::AsRawHandle;
    use std::path::Path;
    use windows_sys::Win32::Storage::FileSystem::{BY_HANDLE_FILE_INFORMATION, GetFileInformationByHandle};

    pub(super) fn information(path: &Path) -> io::Result<BY_HANDLE_FILE_INFORMATION> {
        let file = File::open(path)?;
        // SAFETY: the handle is owned by `file`, which outlives the call, and
        // the out-pointer refers to a properly sized local.
        let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
        let ok = unsafe { GetFileInformationByHandle(file.as_raw_handle() as _, &mut info) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(info)
    }

    pub(super) fn file_id(info: &BY_HANDLE_FILE_INFORMATION) -> FileId {
        FileId {
            volume: u64::from(info.dwVolumeSerialNumber),
            index: (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow),
        }
    }
}

#[cfg(windows)]
impl LinkCapability for SystemLinks {
    fn count_links(&self, path: &Path) -> io::Result<u64> {
        Ok(u64::from(windows::information(path)?.nNumberOfLinks))
    }

    fn file_id(&self, path: &Path) -> io::Result<FileId> {
        Ok(windows::file_id(&windows::information(path)?))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_links_share_identity() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original");
        fs::write(&original, b"bytes").unwrap();
        let links = SystemLinks;
        assert_eq!(links.count_links(&original).unwrap(), 1);

        fs::create_dir_all(dir.path().join("nested")).unwrap();
        let alias = dir.path().join("nested/alias");
        links.create_hard_link(&original, &alias).unwrap();
        assert_eq!(links.count_links(&original).unwrap(), 2);
        assert!(links.same_file(&original, &alias).unwrap());

        let copy = dir.path().join("copy");
        fs::copy(&original, &copy).unwrap();
        assert!(!links.same_file(&original, &copy).unwrap());

        let found = links.enumerate_links(&original, dir.path()).unwrap();
        assert_eq!(found, vec![alias, original]);
    }
}
