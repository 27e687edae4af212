//! Where things live: settings from defaults, `.lfxconfig` and `LFX_*`
//! variables, resolved into absolute directories for one enlistment.

mod environment;
pub mod error;
mod settings;

pub use crate::environment::{CONTENT_DIR, Environment, INFO_DIR, find_enlistment};
pub use crate::settings::{CONFIG_FILE, DEFAULT_SCRATCH_GRACE_SECS, ENV_PREFIX, Settings, default_parallelism};
