//! Cache housekeeping across every configured tier.

use crate::Context;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lfx_storage::{CacheTier, TierStats};
use std::path::PathBuf;

/// Statistics for one tier, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierReport {
    pub name: String,
    pub root: PathBuf,
    pub writable: bool,
    pub stats: TierStats,
}

/// Entry counts and sizes for every tier, nearest first.
pub async fn stats(ctx: &Context) -> Result<Vec<TierReport>> {
    let mut reports = Vec::new();
    for tier in ctx.hierarchy().tiers() {
        let stats = tier.stats().await.or_raise(|| ErrorKind::Storage(format!("cannot read tier `{}`", tier.name())))?;
        reports.push(TierReport {
            name: tier.name().to_string(),
            root: tier.root().to_path_buf(),
            writable: tier.is_writable(),
            stats,
        });
    }
    Ok(reports)
}

/// Remove scratch directories abandoned by interrupted runs, leaving
/// completed entries alone. Returns how many were removed.
pub async fn clean(ctx: &Context) -> Result<u64> {
    let mut removed = 0;
    for tier in ctx.hierarchy().tiers() {
        removed += tier
            .clean(ctx.scratch_grace)
            .await
            .or_raise(|| ErrorKind::Storage(format!("cannot clean tier `{}`", tier.name())))?;
    }
    Ok(removed)
}

/// Delete everything in every writable tier. Refused unless `force` is set.
pub async fn clear(ctx: &Context, force: bool) -> Result<()> {
    if !force {
        exn::bail!(ErrorKind::ClearRequiresForce);
    }
    for tier in ctx.hierarchy().tiers() {
        tier.clear().await.or_raise(|| ErrorKind::Storage(format!("cannot clear tier `{}`", tier.name())))?;
    }
    Ok(())
}
