//! The operations behind each `git lfx` command.
//!
//! - [`fetch`] materializes a pointer into the cache.
//! - [`pull`] does the same, then aliases the content into the working tree
//!   and records an info file for it.
//! - [`checkout`] brings the whole content directory in line with the info
//!   directory.
//! - [`maintenance`] inspects, cleans and clears the cache tiers.

pub mod alias;
pub mod checkout;
mod context;
pub mod error;
mod fetch;
pub mod maintenance;
mod repo_info;
#[cfg(test)]
mod testing;

pub use crate::checkout::{CheckoutEvent, CheckoutReport, CheckoutState, checkout, checkout_stream};
pub use crate::context::Context;
pub use crate::fetch::{Pulled, fetch, pull};
pub use crate::repo_info::RepoInfo;
