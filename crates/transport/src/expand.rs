//! Turning downloaded payloads into content directories.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lfx_progress::{ProgressHandle, ProgressKind};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use std::process::Stdio;
use tracing::instrument;

/// Expand a zip archive into `target`, reporting
/// [`Expand`](ProgressKind::Expand) bytes per extracted file. Returns the
/// total number of bytes written.
#[instrument(level = "debug", skip(archive, target, progress), fields(archive = %archive.display()))]
pub async fn zip(archive: &Path, target: &Path, progress: &ProgressHandle) -> Result<u64> {
    let archive = archive.to_path_buf();
    let target = target.to_path_buf();
    let progress = progress.clone();
    tokio::task::spawn_blocking(move || unzip_blocking(&archive, &target, &progress))
        .await
        .or_raise(|| ErrorKind::Task)?
}

fn unzip_blocking(archive: &Path, target: &Path, progress: &ProgressHandle) -> Result<u64> {
    let file = File::open(archive).or_raise(|| ErrorKind::Io)?;
    let mut zip = ::zip::ZipArchive::new(BufReader::new(file)).or_raise(|| ErrorKind::Archive(archive.to_path_buf()))?;
    fs::create_dir_all(target).or_raise(|| ErrorKind::Io)?;
    let mut total = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).or_raise(|| ErrorKind::Archive(archive.to_path_buf()))?;
        // Rejects absolute paths and `..` components.
        let Some(relative) = entry.enclosed_name() else {
            exn::bail!(ErrorKind::UnsafeEntry(entry.name().to_string()));
        };
        let destination = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&destination).or_raise(|| ErrorKind::Io)?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
        }
        let mut out = File::create(&destination).or_raise(|| ErrorKind::Io)?;
        let written =
            io::copy(&mut entry, &mut out).or_raise(|| ErrorKind::Archive(archive.to_path_buf()))?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode & 0o777)).or_raise(|| ErrorKind::Io)?;
        }
        progress.report(ProgressKind::Expand, written);
        total += written;
    }
    Ok(total)
}

/// Run a self-extracting executable so that it populates `target`.
///
/// `launch_args` is a template: every `{0}` becomes the target directory.
/// The rendered string is split like a shell would split it, honouring
/// double quotes. Expanded bytes are reported once the process exits.
#[instrument(level = "debug", skip(exe, target, progress), fields(exe = %exe.display()))]
pub async fn exe(exe: &Path, launch_args: &str, target: &Path, progress: &ProgressHandle) -> Result<u64> {
    tokio::fs::create_dir_all(target).await.or_raise(|| ErrorKind::Io)?;
    let rendered = launch_args.replace("{0}", &target.display().to_string());
    let args = split_args(&rendered)?;
    make_executable(exe).await?;

    let output = tokio::process::Command::new(exe)
        .args(&args)
        .current_dir(target)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .or_raise(|| ErrorKind::Launch(exe.to_path_buf()))?;
    if !output.status.success() {
        exn::bail!(ErrorKind::LaunchExited {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let target_owned = target.to_path_buf();
    let expanded = tokio::task::spawn_blocking(move || lfx_storage::tree::size(&target_owned))
        .await
        .or_raise(|| ErrorKind::Task)?
        .or_raise(|| ErrorKind::Io)?;
    progress.report(ProgressKind::Expand, expanded);
    Ok(expanded)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = tokio::fs::metadata(path).await.or_raise(|| ErrorKind::Launch(path.to_path_buf()))?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    tokio::fs::set_permissions(path, permissions).await.or_raise(|| ErrorKind::Launch(path.to_path_buf()))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Split a command line on unquoted whitespace. Double quotes group and are
/// removed, so `-o"C:\Program Files"` becomes one argument.
pub fn split_args(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            },
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            },
            c => {
                current.push(c);
                in_token = true;
            },
        }
    }
    if quoted {
        exn::bail!(ErrorKind::LaunchArgs(line.to_string()));
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}
