//! The info file text format.
//!
//! An info file is a tiny git-config style document describing one pointer
//! and, once it has been resolved, the identity and sizes of its content:
//!
//! ```text
//! [lfx]
//! 	type = zip
//! 	url = https://example.com/pkg.zip
//! 	hash = 5f0c...
//! 	size = 1024
//! 	contentSize = 4096
//! ```
//!
//! Keys are always written in the same order, so writing a parsed document
//! reproduces the original bytes.

use crate::error::{ErrorKind, Result};
use crate::{ContentHash, Pointer, PointerKind};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

const SECTION: &str = "[lfx]";

/// A pointer plus whatever has been learned by resolving it.
#[derive(Debug, Clone)]
pub struct Info {
    pub pointer: Pointer,
    /// Bytes downloaded from the origin.
    pub size: Option<u64>,
    /// Bytes on disk after expansion; only set for expanded kinds.
    pub content_size: Option<u64>,
}

impl Info {
    pub fn new(pointer: Pointer) -> Self {
        Self { pointer, size: None, content_size: None }
    }

    pub fn resolved(pointer: &Pointer, hash: ContentHash, size: u64, content_size: Option<u64>) -> Self {
        Self {
            pointer: pointer.with_hash(hash),
            size: Some(size),
            content_size,
        }
    }

    pub fn hash(&self) -> Option<&ContentHash> {
        self.pointer.hash()
    }

    pub fn kind(&self) -> PointerKind {
        self.pointer.kind()
    }

    /// Render the info file text.
    pub fn to_text(&self) -> Result<String> {
        for value in [Some(self.pointer.url().as_str()), self.pointer.launch_args()].into_iter().flatten() {
            if value.contains(['\n', '\r']) {
                exn::bail!(ErrorKind::Malformed {
                    line: 0,
                    reason: "values cannot contain line breaks".to_string(),
                });
            }
        }
        Ok(self.to_string())
    }
}

impl PartialEq for Info {
    fn eq(&self, other: &Self) -> bool {
        self.pointer == other.pointer
            && self.pointer.hash() == other.pointer.hash()
            && self.size == other.size
            && self.content_size == other.content_size
    }
}
impl Eq for Info {}

impl Display for Info {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SECTION}")?;
        writeln!(f, "\ttype = {}", self.pointer.kind())?;
        writeln!(f, "\turl = {}", self.pointer.url())?;
        if let Some(args) = self.pointer.launch_args() {
            writeln!(f, "\targs = {args}")?;
        }
        if let Some(hash) = self.pointer.hash() {
            writeln!(f, "\thash = {hash}")?;
        }
        if let Some(size) = self.size {
            writeln!(f, "\tsize = {size}")?;
        }
        if let Some(content_size) = self.content_size {
            writeln!(f, "\tcontentSize = {content_size}")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Fields<'a> {
    kind: Option<&'a str>,
    url: Option<&'a str>,
    args: Option<&'a str>,
    hash: Option<&'a str>,
    size: Option<&'a str>,
    content_size: Option<&'a str>,
}

fn malformed(line: usize, reason: impl Into<String>) -> ErrorKind {
    ErrorKind::Malformed { line, reason: reason.into() }
}

fn parse_size(value: &str, line: usize) -> Result<u64> {
    Ok(value.parse().map_err(|_| malformed(line, format!("`{value}` is not a byte count")))?)
}

impl FromStr for Info {
    type Err = crate::error::Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut fields = Fields::default();
        let mut seen_section = false;
        for (index, raw) in text.split('\n').enumerate() {
            let line = index + 1;
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with(['#', ';']) {
                continue;
            }
            if trimmed.starts_with('[') {
                if trimmed != SECTION || seen_section {
                    exn::bail!(malformed(line, format!("unexpected section `{trimmed}`")));
                }
                seen_section = true;
                continue;
            }
            if !seen_section {
                exn::bail!(malformed(line, "key before `[lfx]` section"));
            }
            let Some((key, value)) = raw.split_once('=') else {
                exn::bail!(malformed(line, "expected `key = value`"));
            };
            // Exactly one separator space is stripped, so values keep any
            // further whitespace they were written with.
            let value = value.strip_prefix(' ').unwrap_or(value);
            let slot = match key.trim() {
                "type" => &mut fields.kind,
                "url" => &mut fields.url,
                "args" => &mut fields.args,
                "hash" => &mut fields.hash,
                "size" => &mut fields.size,
                "contentSize" => &mut fields.content_size,
                other => exn::bail!(malformed(line, format!("unknown key `{other}`"))),
            };
            if slot.replace(value).is_some() {
                exn::bail!(malformed(line, format!("duplicate key `{}`", key.trim())));
            }
        }

        let kind: PointerKind = fields.kind.ok_or_else(|| malformed(0, "missing `type`"))?.parse()?;
        let url = fields.url.ok_or_else(|| malformed(0, "missing `url`"))?;
        let mut pointer = Pointer::new(kind, url, fields.args.map(str::to_string))?;
        if let Some(hash) = fields.hash {
            pointer = pointer.with_hash(hash.parse()?);
        }
        Ok(Self {
            pointer,
            size: fields.size.map(|s| parse_size(s, 0)).transpose()?,
            content_size: fields.content_size.map(|s| parse_size(s, 0)).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn hash() -> ContentHash {
        ContentHash::of(b"payload")
    }

    #[rstest]
    #[case(Info::new(Pointer::file("https://example.com/a.bin").unwrap()))]
    #[case(Info::resolved(&Pointer::file("https://example.com/a.bin").unwrap(), hash(), 100, None))]
    #[case(Info::resolved(&Pointer::zip("https://example.com/a.zip").unwrap(), hash(), 1024, Some(4096)))]
    #[case(Info::resolved(&Pointer::exe("https://example.com/a.exe", "-o\"{0}\" -y").unwrap(), hash(), 1, Some(2)))]
    fn test_write_parse_write(#[case] info: Info) {
        let text = info.to_text().unwrap();
        let parsed: Info = text.parse().unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.to_text().unwrap(), text);
    }

    #[test]
    fn test_layout() {
        let info = Info::resolved(&Pointer::zip("https://example.com/pkg.zip").unwrap(), hash(), 10, Some(20));
        let expected = format!(
            "[lfx]\n\ttype = zip\n\turl = https://example.com/pkg.zip\n\thash = {}\n\tsize = 10\n\tcontentSize = 20\n",
            hash()
        );
        assert_eq!(info.to_text().unwrap(), expected);
    }

    #[test]
    fn test_parse_tolerates_crlf_and_comments() {
        let text = "# tracked by git-lfx\r\n[lfx]\r\n  type = file\r\n  url = https://example.com/a\r\n\r\n";
        let info: Info = text.parse().unwrap();
        assert_eq!(info.kind(), PointerKind::File);
        assert_eq!(info.pointer.url().as_str(), "https://example.com/a");
        assert!(info.hash().is_none());
    }

    #[rstest]
    #[case("type = file\n")]
    #[case("[lfx]\n\turl = https://example.com/a\n")]
    #[case("[lfx]\n\ttype = tarball\n\turl = https://example.com/a\n")]
    #[case("[lfx]\n\ttype = file\n\turl = https://example.com/a\n\tcolor = blue\n")]
    #[case("[lfx]\n\ttype = file\n\ttype = zip\n\turl = https://example.com/a\n")]
    #[case("[lfx]\n\ttype = file\n\turl = https://example.com/a\n\tsize = lots\n")]
    #[case("[lfx]\n\ttype = file\n\turl = https://example.com/a\n\thash = 1234\n")]
    #[case("[lfx]\n\ttype = exe\n\turl = https://example.com/a\n")]
    #[case("[other]\n\ttype = file\n")]
    fn test_parse_rejects(#[case] text: &str) {
        assert!(text.parse::<Info>().is_err());
    }
}
