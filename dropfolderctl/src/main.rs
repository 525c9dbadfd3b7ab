//! `dropfolderctl`: watch drop folders for torrents from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "dropfolderctl", version)]
#[command(about = "Watch directories for .torrent and .magnet files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch directories and print every batch of ready files
    Watch(WatchArgs),
    /// Print whether each directory would be watched locally or polled
    Classify {
        /// Directories to classify
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Validate torrent files with the default bencode validator
    Check {
        /// Files to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
struct WatchArgs {
    /// Directories to watch, in addition to the configured ones
    dirs: Vec<PathBuf>,

    /// Config file (TOML or JSON). Defaults to DROPFOLDER_CONFIG_PATH,
    /// DROPFOLDER_CONFIG_JSON, then ./dropfolder.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network poll and partial file retry interval (overrides config)
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Retries before a partial torrent is renamed (overrides config)
    #[arg(long)]
    max_retries: Option<u32>,
}

fn init_tracing(fallback: Option<&str>) {
    let fallback = fallback.unwrap_or("info").to_string();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => commands::watch(args).await,
        Command::Classify { dirs } => {
            init_tracing(None);
            Ok(commands::classify(&dirs))
        }
        Command::Check { files } => {
            init_tracing(None);
            Ok(commands::check(&files))
        }
    }
}
