//! Tunnelscope - Terminal console for traffic flowing through a tunnel
//!
//! Usage:
//!   tunnelscope [ADDR]          Watch the inspection server at ADDR
//!   tunnelscope --plain         Print traffic as lines instead of the TUI
//!   tunnelscope config          Show the config file

mod commands;
mod config;
mod inspector;
mod metrics;
mod transport;
mod tui;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunnelscope_common::Method;

#[derive(Parser)]
#[command(name = "tunnelscope")]
#[command(author = "Tunnelscope Team")]
#[command(version)]
#[command(about = "Watch HTTP traffic flowing through a tunnel", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    watch: WatchArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch traffic (default)
    Watch(WatchArgs),

    /// Show the config file
    Config {
        /// Write the default config if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Clone, Default)]
struct WatchArgs {
    /// Inspection server (port, host:port, or URL)
    #[arg(env = "TUNNELSCOPE_ADDR")]
    addr: Option<String>,

    /// Print one line per event instead of the TUI
    #[arg(long)]
    plain: bool,

    /// Treat the search text as a regular expression
    #[arg(long)]
    regex: bool,

    /// Only show these methods (repeatable)
    #[arg(short, long = "method", value_name = "METHOD")]
    methods: Vec<Method>,

    /// Initial search text, matched against "METHOD /path"
    #[arg(short, long)]
    search: Option<String>,

    /// Pause between failed connect attempts
    #[arg(long, value_name = "MS")]
    retry_delay_ms: Option<u64>,
}

impl From<WatchArgs> for commands::watch::WatchOptions {
    fn from(args: WatchArgs) -> Self {
        Self {
            addr: args.addr,
            plain: args.plain,
            regex: args.regex,
            methods: args.methods,
            search: args.search,
            retry_delay_ms: args.retry_delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let watch = match &cli.command {
        Some(Commands::Watch(args)) => Some(args.clone()),
        Some(Commands::Config { .. }) => None,
        None => Some(cli.watch.clone()),
    };
    let tui_mode = watch.as_ref().is_some_and(|args| !args.plain);

    // Ensure config directories exist
    config::ensure_dirs()?;

    init_logging(cli.verbose, tui_mode)?;

    match (cli.command, watch) {
        (Some(Commands::Config { init }), _) => commands::config::run(init)?,
        (_, Some(args)) => commands::watch::run(args.into()).await?,
        (_, None) => {}
    }

    Ok(())
}

/// Log to stderr, or to a file while the TUI owns the terminal
fn init_logging(verbose: bool, tui_mode: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tunnelscope_cli=info", log_level).into());

    if tui_mode {
        let path = config::logs_dir().join("tunnelscope.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
