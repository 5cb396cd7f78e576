//! shoecache - command line driver for the storefront's offline layer.
//!
//! Runs the interception layer, connectivity monitor and local persistence
//! against the real backend, with the cache and local storage kept under
//! the user's cache directory.

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shoecache_core::Config;

#[derive(Parser, Debug)]
#[command(name = "shoecache")]
#[command(about = "Offline cache and connectivity layer for the Extravagant Style storefront")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/shoecache/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat the network as unavailable
    #[arg(long, global = true)]
    offline: bool,

    /// Also write logs to a daily rolling file at this path
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Precache the asset manifest into the current generation
    Install,
    /// Delete superseded cache generations
    Activate,
    /// Route one request through the interception layer
    Fetch {
        url: String,
        /// Treat as a page navigation
        #[arg(long)]
        navigate: bool,
        #[arg(long, default_value = "GET")]
        method: String,
    },
    /// Show the store list, falling back to the local copy
    Stores {
        /// Open this store, which restarts the offline notice window
        #[arg(long)]
        visit: Option<i64>,
    },
    /// Show the user list, falling back to the local copy
    Users,
    /// Inspect or manage the persisted checkout
    Checkout {
        #[command(subcommand)]
        action: CheckoutAction,
    },
    /// Turn a push payload into a notification
    Push {
        /// JSON payload file, `-` for stdin
        payload: PathBuf,
        /// Also simulate a click on the notification
        #[arg(long)]
        click: bool,
    },
    /// Probe connectivity periodically and report changes
    Watch {
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum CheckoutAction {
    /// Print the persisted checkout, if still restorable
    Show,
    /// Compute totals for a cart file and persist them
    Save {
        /// JSON array of cart items
        items: PathBuf,
        /// Coupon code to validate and apply
        #[arg(long)]
        coupon: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Forget the persisted checkout
    Clear,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let prefix = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "shoecache.log".to_string());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_deref());

    let config = match args.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!(generation = %config.cache_version, offline = args.offline, "shoecache starting");

    let runtime = commands::Runtime::new(config, args.offline).await?;
    let result = match args.command {
        Command::Install => commands::install(&runtime).await,
        Command::Activate => commands::activate(&runtime).await,
        Command::Fetch { url, navigate, method } => commands::fetch(&runtime, &url, navigate, &method).await,
        Command::Stores { visit } => commands::stores(&runtime, visit).await,
        Command::Users => commands::users(&runtime).await,
        Command::Checkout { action } => commands::checkout(&runtime, action).await,
        Command::Push { payload, click } => commands::push(&runtime, &payload, click).await,
        Command::Watch { interval } => commands::watch(&runtime, interval).await,
    };
    runtime.print_notices();
    result
}
