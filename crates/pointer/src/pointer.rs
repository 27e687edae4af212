use crate::ContentHash;
use crate::error::{ErrorKind, Result};
use derive_more::Display;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use url::Url;

/// How the downloaded payload becomes cached content.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// The download is the content.
    #[display("file")]
    File,
    /// The download is a zip archive, expanded into a directory.
    #[display("zip")]
    Zip,
    /// The download is a self-extracting executable, run to populate a directory.
    #[display("exe")]
    Exe,
}
impl PointerKind {
    /// Whether the cached content for this kind is a directory.
    pub fn is_expanded(&self) -> bool {
        !matches!(self, Self::File)
    }
}
impl FromStr for PointerKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Self::File),
            "zip" => Ok(Self::Zip),
            "exe" => Ok(Self::Exe),
            other => exn::bail!(ErrorKind::UnknownKind(other.to_string())),
        }
    }
}

/// Identity of wanted content: where it lives and how to turn it into files.
///
/// Equality and hashing consider only `(kind, url, launch_args)`; the content
/// hash is additive information learned once the pointer has been resolved.
#[derive(Debug, Clone)]
pub struct Pointer {
    kind: PointerKind,
    url: Url,
    launch_args: Option<String>,
    hash: Option<ContentHash>,
}

impl Pointer {
    pub fn file(url: &str) -> Result<Self> {
        Self::new(PointerKind::File, url, None)
    }

    pub fn zip(url: &str) -> Result<Self> {
        Self::new(PointerKind::Zip, url, None)
    }

    /// `launch_args` is a template; `{0}` is replaced by the directory the
    /// executable should expand into.
    pub fn exe(url: &str, launch_args: &str) -> Result<Self> {
        Self::new(PointerKind::Exe, url, Some(launch_args.to_string()))
    }

    pub fn new(kind: PointerKind, url: &str, launch_args: Option<String>) -> Result<Self> {
        let url = parse_absolute(url)?;
        match (kind, launch_args.as_deref()) {
            (PointerKind::Exe, None) => exn::bail!(ErrorKind::MissingLaunchArgs),
            (PointerKind::Exe, Some(args)) if args.trim().is_empty() => exn::bail!(ErrorKind::MissingLaunchArgs),
            (PointerKind::File | PointerKind::Zip, Some(_)) => exn::bail!(ErrorKind::UnexpectedLaunchArgs),
            _ => {},
        }
        Ok(Self { kind, url, launch_args, hash: None })
    }

    /// Return a copy that also carries the resolved content hash.
    pub fn with_hash(&self, hash: ContentHash) -> Self {
        Self { hash: Some(hash), ..self.clone() }
    }

    pub fn kind(&self) -> PointerKind {
        self.kind
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn launch_args(&self) -> Option<&str> {
        self.launch_args.as_deref()
    }

    pub fn hash(&self) -> Option<&ContentHash> {
        self.hash.as_ref()
    }
}

fn parse_absolute(url: &str) -> Result<Url> {
    // `Url::parse` only succeeds for absolute URLs; relative references
    // error with `RelativeUrlWithoutBase`. Cannot-be-a-base URLs such as
    // `mailto:` name no fetchable resource.
    match Url::parse(url) {
        Ok(parsed) if !parsed.cannot_be_a_base() => Ok(parsed),
        _ => exn::bail!(ErrorKind::InvalidUrl(url.to_string())),
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.url == other.url && self.launch_args == other.launch_args
    }
}
impl Eq for Pointer {}

impl Hash for Pointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.url.hash(state);
        self.launch_args.hash(state);
    }
}
