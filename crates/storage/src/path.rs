//! Path validation.
//!
//! Working-tree paths arrive from the command line and from info files, so
//! they are checked lexically before anything touches the filesystem. The
//! paths may not exist yet, which rules out `canonicalize`.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a path that must stay below some root.
///
/// `..` may be used as long as it never climbs above the starting point.
/// Null bytes and Windows drive prefixes are rejected, as is anything that
/// normalizes to the root itself.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use lfx_storage::validate_path;
/// assert!(validate_path("tools/compiler.zip").is_ok());
/// assert!(validate_path("a/../file.bin").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert_eq!(validate_path("sdk/./lib//x.bin/").unwrap(), Path::new("sdk/lib/x.bin"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // C strings in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

/// Lexically resolve `path` against `base` (when relative), folding away
/// `.` and `..` without consulting the filesystem.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                // Popping past the root is a no-op, same as the OS does.
                out.pop();
            },
            Component::CurDir => {},
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The path of `path` relative to `root`, provided it lies strictly inside.
///
/// Both arguments must be absolute; `path` is normalized lexically first so
/// `root/a/../../x` is rejected rather than trusted.
pub fn relative_within(root: &Path, path: &Path) -> Result<PathBuf> {
    if !root.is_absolute() || !path.is_absolute() {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    let normalized = absolutize(root, path);
    let Ok(relative) = normalized.strip_prefix(absolutize(root, root)) else {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    };
    validate(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sdk/compiler.zip", "sdk/compiler.zip")]
    #[case("a//b//c", "a/b/c")]
    #[case("a/./b/./c", "a/b/c")]
    #[case("a/b/..", "a")]
    #[case("tools/", "tools")]
    #[case("tools///", "tools")]
    fn test_valid_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("..")]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    #[case("a\0b")]
    fn test_invalid_paths(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[cfg(unix)]
    #[rstest]
    #[case("/repo", "lfx/a.bin", "/repo/lfx/a.bin")]
    #[case("/repo", "../other/a.bin", "/other/a.bin")]
    #[case("/repo", "/abs/./x/../y", "/abs/y")]
    #[case("/", "../../x", "/x")]
    fn test_absolutize(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(absolutize(Path::new(base), Path::new(path)), Path::new(expected));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_within() {
        let root = Path::new("/repo/lfx");
        assert_eq!(relative_within(root, Path::new("/repo/lfx/sdk/x.zip")).unwrap(), Path::new("sdk/x.zip"));
        assert!(relative_within(root, Path::new("/repo/lfx")).is_err());
        assert!(relative_within(root, Path::new("/repo/lfx/../src/main.rs")).is_err());
        assert!(relative_within(root, Path::new("/repo/lfxother/x")).is_err());
        assert!(relative_within(root, Path::new("/etc/passwd")).is_err());
        assert!(relative_within(root, Path::new("relative")).is_err());
    }
}
