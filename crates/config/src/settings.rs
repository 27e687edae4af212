use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional settings file at the enlistment root.
pub const CONFIG_FILE: &str = ".lfxconfig";
/// Prefix of every environment variable read as a setting.
pub const ENV_PREFIX: &str = "LFX_";

const MAX_DEFAULT_PARALLELISM: usize = 16;
/// Scratch directories untouched for this long are considered abandoned.
pub const DEFAULT_SCRATCH_GRACE_SECS: u64 = 60 * 60;

/// User-tunable settings.
///
/// Sources, lowest precedence first: built-in defaults, the `.lfxconfig`
/// TOML file in the enlistment, then `LFX_*` environment variables
/// (`LFX_DISK_CACHE`, `LFX_BUS_CACHE`, `LFX_LAN_CACHE`, `LFX_PARALLELISM`,
/// `LFX_SCRATCH_GRACE_SECS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Private cache; defaults to the per-user cache directory.
    pub disk_cache: Option<PathBuf>,
    /// Shared read-write cache, usually on a network share.
    pub bus_cache: Option<PathBuf>,
    /// Read-only mirror.
    pub lan_cache: Option<PathBuf>,
    /// Records checked out concurrently.
    pub parallelism: usize,
    /// Scratch directories younger than this survive `cache --clean`.
    pub scratch_grace_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            disk_cache: None,
            bus_cache: None,
            lan_cache: None,
            parallelism: default_parallelism(),
            scratch_grace_secs: DEFAULT_SCRATCH_GRACE_SECS,
        }
    }
}

impl Settings {
    pub fn figment(enlistment: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(enlistment.join(CONFIG_FILE)))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load settings for the enlistment rooted at `enlistment`.
    pub fn load(enlistment: &Path) -> Result<Self> {
        let settings: Self = Self::figment(enlistment).extract().or_raise(|| ErrorKind::Invalid)?;
        settings.validate()?;
        tracing::debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            exn::bail!(ErrorKind::ZeroParallelism);
        }
        let tiers = [("disk_cache", &self.disk_cache), ("bus_cache", &self.bus_cache), ("lan_cache", &self.lan_cache)];
        for (name, path) in tiers {
            if let Some(path) = path
                && !path.is_absolute()
            {
                exn::bail!(ErrorKind::RelativePath { name, path: path.clone() });
            }
        }
        Ok(())
    }

    pub fn scratch_grace(&self) -> Duration {
        Duration::from_secs(self.scratch_grace_secs)
    }
}

/// Twice the CPU count, capped: workers spend most of their time waiting on
/// the network.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map_or(1, |n| n.get())
        .saturating_mul(2)
        .min(MAX_DEFAULT_PARALLELISM)
}
