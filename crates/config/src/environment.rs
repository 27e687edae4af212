use crate::error::{ErrorKind, Result};
use crate::settings::{ENV_PREFIX, Settings};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the enlistment root holding materialized content.
pub const CONTENT_DIR: &str = "lfx";
/// Directory under the enlistment root holding one info file per content path.
pub const INFO_DIR: &str = ".lfx";

/// Every absolute path a command needs, resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub working_dir: PathBuf,
    /// Nearest ancestor of the working directory holding `.git`.
    pub enlistment_dir: PathBuf,
    pub content_dir: PathBuf,
    pub info_dir: PathBuf,
    pub disk_cache_dir: PathBuf,
    pub bus_cache_dir: Option<PathBuf>,
    pub lan_cache_dir: Option<PathBuf>,
    pub parallelism: usize,
    pub scratch_grace: Duration,
}

impl Environment {
    /// Resolve the environment for the process's current directory.
    pub fn discover() -> Result<Self> {
        let working_dir = std::env::current_dir().or_raise(|| ErrorKind::WorkingDir)?;
        Self::from_working_dir(working_dir)
    }

    pub fn from_working_dir(working_dir: impl Into<PathBuf>) -> Result<Self> {
        let working_dir = working_dir.into();
        let enlistment_dir = find_enlistment(&working_dir);
        let settings = Settings::load(&enlistment_dir)?;
        Self::resolve(working_dir, enlistment_dir, settings)
    }

    pub fn resolve(working_dir: PathBuf, enlistment_dir: PathBuf, settings: Settings) -> Result<Self> {
        let disk_cache_dir = match settings.disk_cache {
            Some(dir) => dir,
            None => default_disk_cache()?,
        };
        Ok(Self {
            content_dir: enlistment_dir.join(CONTENT_DIR),
            info_dir: enlistment_dir.join(INFO_DIR),
            disk_cache_dir,
            bus_cache_dir: settings.bus_cache,
            lan_cache_dir: settings.lan_cache,
            parallelism: settings.parallelism,
            scratch_grace: Duration::from_secs(settings.scratch_grace_secs),
            working_dir,
            enlistment_dir,
        })
    }

    /// The tier variables as currently set in the process environment, for
    /// display. Unset variables have an empty value.
    pub fn variables() -> Vec<(String, String)> {
        ["DISK_CACHE", "BUS_CACHE", "LAN_CACHE"]
            .into_iter()
            .map(|suffix| {
                let name = format!("{ENV_PREFIX}{suffix}");
                let value = std::env::var(&name).unwrap_or_default();
                (name, value)
            })
            .collect()
    }

    /// Labelled directories in display order.
    pub fn directories(&self) -> Vec<(&'static str, Option<&Path>)> {
        vec![
            ("WorkingDir", Some(self.working_dir.as_path())),
            ("EnlistmentDir", Some(self.enlistment_dir.as_path())),
            ("ContentDir", Some(self.content_dir.as_path())),
            ("InfoDir", Some(self.info_dir.as_path())),
            ("DiskCacheDir", Some(self.disk_cache_dir.as_path())),
            ("BusCacheDir", self.bus_cache_dir.as_deref()),
            ("LanCacheDir", self.lan_cache_dir.as_deref()),
        ]
    }
}

/// Walk up from `dir` to the first directory containing `.git`. Falls back to
/// `dir` itself outside a repository.
pub fn find_enlistment(dir: &Path) -> PathBuf {
    dir.ancestors()
        .find(|candidate| candidate.join(".git").exists())
        .unwrap_or(dir)
        .to_path_buf()
}

fn default_disk_cache() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "git-lfx")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or_else(|| exn::Exn::from(ErrorKind::NoCacheDir))
}
