//! Content hashing.
//!
//! A file hashes as its raw bytes. A directory hashes as a canonical
//! traversal: every regular file in byte-wise sorted relative path order
//! (with `/` separators), each contributing its path, a NUL, its length as a
//! little-endian `u64`, then its bytes. Empty directories contribute nothing.

use crate::error::{ErrorKind, Result};
use crate::tree::files;
use exn::ResultExt;
use lfx_pointer::ContentHash;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Hash a file or directory on the blocking pool.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub async fn digest(path: &Path) -> Result<ContentHash> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || digest_blocking(&path)).await.or_raise(|| ErrorKind::Task)?
}

pub fn digest_blocking(path: &Path) -> Result<ContentHash> {
    let metadata = std::fs::metadata(path).map_err(|e| ErrorKind::from_io(e, path))?;
    let mut hasher = blake3::Hasher::new();
    if metadata.is_file() {
        update_from_file(&mut hasher, path)?;
        return Ok(hasher.finalize().into());
    }
    let mut entries: Vec<(Vec<u8>, PathBuf)> = files(path)?
        .into_iter()
        .map(|relative| (canonical_bytes(&relative), path.join(relative)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, absolute) in entries {
        let len = std::fs::metadata(&absolute).map_err(|e| ErrorKind::from_io(e, &absolute))?.len();
        hasher.update(&name);
        hasher.update(&[0]);
        hasher.update(&len.to_le_bytes());
        update_from_file(&mut hasher, &absolute)?;
    }
    Ok(hasher.finalize().into())
}

fn update_from_file(hasher: &mut blake3::Hasher, path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
    hasher.update_reader(file).map_err(ErrorKind::Io)?;
    Ok(())
}

/// Relative path bytes joined with `/` regardless of platform.
fn canonical_bytes(relative: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, component) in relative.components().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(component.as_os_str().as_encoded_bytes());
    }
    out
}
