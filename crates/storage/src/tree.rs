//! Blocking helpers for whole files-or-directories.

use crate::error::{ErrorKind, Result};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Relative paths of every regular file below `root`. Symlinks are skipped.
pub fn files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(relative) = stack.pop() {
        let current = root.join(&relative);
        for entry in fs::read_dir(&current).map_err(|e| ErrorKind::from_io(e, &current))? {
            let entry = entry.map_err(ErrorKind::Io)?;
            let file_type = entry.file_type().map_err(ErrorKind::Io)?;
            let child = relative.join(entry.file_name());
            if file_type.is_dir() {
                stack.push(child);
            } else if file_type.is_file() {
                out.push(child);
            }
        }
    }
    Ok(out)
}

/// Total bytes of a file, or of every regular file below a directory.
pub fn size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| ErrorKind::from_io(e, path))?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }
    let mut total = 0;
    for relative in files(path)? {
        let absolute = path.join(relative);
        total += fs::metadata(&absolute).map_err(|e| ErrorKind::from_io(e, &absolute))?.len();
    }
    Ok(total)
}

/// Copy a file or directory tree to `target`, which must not exist yet.
/// `on_bytes` sees every chunk written.
pub fn copy(source: &Path, target: &Path, on_bytes: &mut dyn FnMut(u64)) -> Result<u64> {
    let metadata = fs::metadata(source).map_err(|e| ErrorKind::from_io(e, source))?;
    if metadata.is_file() {
        return copy_file(source, target, on_bytes);
    }
    fs::create_dir_all(target).map_err(|e| ErrorKind::from_io(e, target))?;
    let mut total = 0;
    for relative in files(source)? {
        let destination = target.join(&relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        total += copy_file(&source.join(&relative), &destination, on_bytes)?;
    }
    Ok(total)
}

fn copy_file(source: &Path, target: &Path, on_bytes: &mut dyn FnMut(u64)) -> Result<u64> {
    let mut reader = fs::File::open(source).map_err(|e| ErrorKind::from_io(e, source))?;
    let mut writer = fs::File::create_new(target).map_err(|e| ErrorKind::from_io(e, target))?;
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0;
    loop {
        let read = reader.read(&mut buffer).map_err(ErrorKind::Io)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).map_err(ErrorKind::Io)?;
        total += read as u64;
        on_bytes(read as u64);
    }
    writer.flush().map_err(ErrorKind::Io)?;
    // Carry the executable bit; expanded tools must stay runnable.
    fs::set_permissions(target, reader.metadata().map_err(ErrorKind::Io)?.permissions())
        .map_err(|e| ErrorKind::from_io(e, target))?;
    Ok(total)
}

/// Most recent modification time of `path` or anything below it. A
/// download in progress keeps refreshing its file, so this tracks activity
/// where the directory's own timestamp does not.
pub fn last_modified(path: &Path) -> Result<SystemTime> {
    let mut newest = fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| ErrorKind::from_io(e, path))?;
    let mut stack = vec![path.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => continue,
            Err(e) => return Err(ErrorKind::from_io(e, &current).into()),
        };
        for entry in entries {
            let entry = entry.map_err(ErrorKind::Io)?;
            let metadata = entry.metadata().map_err(ErrorKind::Io)?;
            newest = newest.max(metadata.modified().map_err(ErrorKind::Io)?);
            if metadata.is_dir() {
                stack.push(entry.path());
            }
        }
    }
    Ok(newest)
}

/// Remove a file or directory tree. Missing paths are not an error.
pub fn remove(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    Ok(result.map_err(|e| ErrorKind::from_io(e, path))?)
}
