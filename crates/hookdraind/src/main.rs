//! hookdraind — the hookdrain daemon.
//!
//! Single binary around the drain decision loop:
//! - `run`: drive one lifecycle event to resolution in-process
//! - `admit` / `scheduler`: checkpointed drains re-entered on a schedule
//! - `status`, `pause`, `metric`: inspect and feed the local state store
//!
//! # Usage
//!
//! ```text
//! hookdraind --data-dir /var/lib/hookdrain scheduler --inbox /var/spool/hookdrain
//! hookdraind run --event event.json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "hookdraind",
    about = "hookdrain: decide when a paused instance termination may proceed",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory for persistent state.
    #[arg(long, global = true, default_value = "/var/lib/hookdrain")]
    data_dir: PathBuf,

    /// Path to hookdrain.toml (default: <data-dir>/hookdrain.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a lifecycle event to resolution, sleeping between checks.
    Run {
        /// Event file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        event: String,
    },
    /// Register a lifecycle event for scheduled re-entry and run its first check.
    Admit {
        /// Event file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        event: String,
    },
    /// Re-enter due drains on every tick until Ctrl-C.
    Scheduler {
        /// Directory of `*.json` lifecycle events to admit on each tick.
        #[arg(long)]
        inbox: Option<PathBuf>,
        /// Run a single tick and exit.
        #[arg(long)]
        once: bool,
    },
    /// Print all drain checkpoints as JSON.
    Status,
    /// Manage the local lifecycle pause ledger.
    Pause {
        #[command(subcommand)]
        action: PauseAction,
    },
    /// Publish usage samples to the local metric store.
    Metric {
        #[command(subcommand)]
        action: MetricAction,
    },
}

#[derive(Subcommand)]
enum PauseAction {
    /// Open a pending pause for an instance.
    Begin {
        #[arg(long)]
        instance: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        hook: String,
    },
    /// Print all pauses as JSON.
    Show,
}

#[derive(Subcommand)]
enum MetricAction {
    /// Record one usage sample for an instance.
    Put {
        #[arg(long)]
        instance: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        value: f64,
        /// Unix timestamp of the sample (default: now).
        #[arg(long)]
        at: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let ctx = commands::Context::load(cli.data_dir, cli.config)?;

    match cli.command {
        Command::Run { event } => commands::run(&ctx, &event).await,
        Command::Admit { event } => commands::admit(&ctx, &event).await,
        Command::Scheduler { inbox, once } => commands::scheduler(&ctx, inbox, once).await,
        Command::Status => commands::status(&ctx),
        Command::Pause { action } => match action {
            PauseAction::Begin {
                instance,
                group,
                hook,
            } => commands::pause_begin(&ctx, &instance, &group, &hook),
            PauseAction::Show => commands::pause_show(&ctx),
        },
        Command::Metric { action } => match action {
            MetricAction::Put {
                instance,
                group,
                value,
                at,
            } => commands::metric_put(&ctx, &instance, &group, value, at),
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hookdraind=debug,hookdrain_loop=debug"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
