//! `git lfx`: large content in git, as pointers to a shared cache.

use clap::{Args, Parser, Subcommand};
use exn::ResultExt;
use lfx_config::Environment;
use lfx_library::error::{Error, ErrorKind, Result, root_causes};
use lfx_library::{CheckoutState, Context, maintenance};
use lfx_pointer::{Pointer, PointerKind};
use lfx_progress::{HumanBytes, ProgressAggregator};
use lfx_transport::Transports;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-lfx", version, about = "Sync large content into a git enlistment from a tiered cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump environment.
    Env,
    /// Sync content in the lfx directory using the pointers in the .lfx directory.
    Checkout {
        #[command(flatten)]
        output: Output,
    },
    /// Pull content to a path in lfx and add the corresponding pointer to .lfx.
    Pull {
        path: PathBuf,
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        output: Output,
    },
    /// Fetch content and echo its pointer.
    Fetch {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        output: Output,
    },
    /// Dump cache stats.
    Cache {
        /// Delete orphaned temporary directories.
        #[arg(long, conflicts_with = "clear")]
        clean: bool,
        /// Delete all caches on this machine.
        #[arg(long)]
        clear: bool,
        /// Must be specified with --clear.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct Source {
    url: String,
    /// Arguments for a self-expanding archive. `{0}` is replaced with the
    /// target directory.
    launch_args: Option<String>,
    /// The url points to a zip archive.
    #[arg(long, conflicts_with = "exe")]
    zip: bool,
    /// The url points to a self-expanding archive.
    #[arg(long, requires = "launch_args")]
    exe: bool,
}

impl Source {
    fn pointer(&self) -> Result<Pointer> {
        let kind = match (self.zip, self.exe) {
            (true, _) => PointerKind::Zip,
            (_, true) => PointerKind::Exe,
            _ => PointerKind::File,
        };
        Pointer::new(kind, &self.url, self.launch_args.clone()).or_raise(|| ErrorKind::InvalidPointer(self.url.clone()))
    }
}

#[derive(Args)]
struct Output {
    /// Suppress progress reporting.
    #[arg(short, long)]
    quiet: bool,
}

impl Output {
    fn progress(&self) -> Option<Arc<ProgressAggregator>> {
        (!self.quiet).then(|| {
            Arc::new(ProgressAggregator::new().with_renderer(Duration::from_millis(100), |snapshot| {
                let mut stderr = std::io::stderr().lock();
                let _ = write!(stderr, "\r{snapshot}\x1b[K");
                let _ = stderr.flush();
            }))
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LFX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            report(&err, None);
            ExitCode::FAILURE
        },
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    let env = Environment::discover().or_raise(|| ErrorKind::Config)?;
    match command {
        Command::Env => {
            println!("Environment Variables:");
            for (name, value) in Environment::variables() {
                println!("  {name}={value}");
            }
            println!();
            println!("Directories:");
            for (label, dir) in env.directories() {
                println!("  {label}: {}", dir.map(|d| d.display().to_string()).unwrap_or_default());
            }
        },
        Command::Fetch { source, output } => {
            let pointer = source.pointer()?;
            let ctx = context(&env, output.progress())?;
            let entry = lfx_library::fetch(&ctx, &pointer).await;
            end_progress(&ctx);
            let text = entry?.info.to_text().or_raise(|| ErrorKind::InvalidPointer(source.url.clone()))?;
            print!("{text}");
        },
        Command::Pull { path, source, output } => {
            let pointer = source.pointer()?;
            let ctx = context(&env, output.progress())?;
            let pulled = lfx_library::pull(&ctx, &env.working_dir, &path, &pointer).await;
            end_progress(&ctx);
            pulled?;
        },
        Command::Checkout { output } => {
            let ctx = context(&env, output.progress())?;
            let outcome = lfx_library::checkout(&ctx).await;
            end_progress(&ctx);
            let outcome = outcome?;
            for failure in &outcome.failures {
                report(&failure.error, Some(&failure.info_path));
            }
            if outcome.state() == CheckoutState::PartiallyFailed {
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Cache { clean, clear, force } => {
            let ctx = context(&env, None)?;
            if clear {
                maintenance::clear(&ctx, force).await?;
            } else if clean {
                let removed = maintenance::clean(&ctx).await?;
                println!("Removed {removed} orphaned temporary directories.");
            } else {
                for tier in maintenance::stats(&ctx).await? {
                    let access = if tier.writable { "" } else { ", read-only" };
                    println!(
                        "{} ({}{access}): {} entries, {}",
                        tier.name,
                        tier.root.display(),
                        tier.stats.entries,
                        HumanBytes(tier.stats.bytes)
                    );
                }
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn context(env: &Environment, progress: Option<Arc<ProgressAggregator>>) -> Result<Context> {
    let transport = Transports::standard().or_raise(|| ErrorKind::Config)?;
    Context::new(env, Arc::new(transport), progress)
}

/// Show the final progress line, whatever the outcome, and move past it.
fn end_progress(ctx: &Context) {
    ctx.finish_progress();
    if ctx.progress.is_some() {
        eprintln!();
    }
}

/// Print the failure, then whatever set it off.
fn report(err: &Error, subject: Option<&Path>) {
    let subject = subject.map(|path| format!("{}: ", path.display())).unwrap_or_default();
    eprintln!("error: {subject}{}", **err);
    let message = err.to_string();
    for cause in root_causes(err).into_iter().filter(|cause| *cause != message) {
        eprintln!("  caused by: {cause}");
    }
    tracing::debug!(error = ?err, "Failure detail");
}
