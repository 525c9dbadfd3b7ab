use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use dropfolder_config::{ConfigSource, DropFolderConfig, validate_watch_config};
use dropfolder_core::{
    BencodeValidator, Collaborators, MetadataValidator, PathClassifier, ReadyBatch,
    StatfsClassifier, WatchService,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{WatchArgs, init_tracing};

fn load_config(explicit: Option<&Path>) -> anyhow::Result<(DropFolderConfig, ConfigSource)> {
    match explicit {
        Some(path) => {
            let config = DropFolderConfig::load_from_file(path)?;
            Ok((config, ConfigSource::File(path.to_path_buf())))
        }
        None => DropFolderConfig::load_from_env().context("failed to load configuration"),
    }
}

pub async fn watch(args: WatchArgs) -> anyhow::Result<ExitCode> {
    let (mut config, source) = load_config(args.config.as_deref())?;
    init_tracing(config.log_filter.as_deref());

    match &source {
        ConfigSource::Default => info!("no config file found, using defaults"),
        ConfigSource::EnvInline => info!("config loaded from inline environment json"),
        ConfigSource::EnvPath(path) | ConfigSource::File(path) => {
            info!(path = %path.display(), "config loaded from file")
        }
    }

    if let Some(interval) = args.poll_interval_ms {
        config.watch.poll_interval_ms = interval;
    }
    if let Some(retries) = args.max_retries {
        config.watch.max_partial_retries = retries;
    }
    validate_watch_config(&config.watch).context("invalid watch settings")?;

    let mut dirs: Vec<PathBuf> = args.dirs;
    dirs.extend(config.directories.iter().cloned());
    if dirs.is_empty() {
        bail!("no directories to watch; pass them as arguments or list them in the config");
    }

    info!(
        watch.poll_interval_ms = config.watch.poll_interval_ms,
        watch.max_partial_retries = config.watch.max_partial_retries,
        watch.debounce_ms = config.watch.debounce_ms,
        watch.invalid_suffix = %config.watch.invalid_suffix,
        "watch configuration in effect"
    );

    let (sink, mut batches) = mpsc::unbounded_channel::<ReadyBatch>();
    let service = WatchService::spawn(
        config.watch.clone(),
        Collaborators::system(BencodeValidator::new()),
        sink,
    );
    for dir in dirs {
        if !dir.is_dir() {
            warn!("{} is not a directory, skipping", dir.display());
            continue;
        }
        service.add_path(dir)?;
    }

    let watched = service.directories().await?;
    if watched.is_empty() {
        service.shutdown().await?;
        bail!("none of the given directories exist");
    }
    for dir in &watched {
        info!("watching {}", dir.display());
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            batch = batches.recv() => match batch {
                Some(batch) => print_batch(&batch),
                None => break,
            },
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!("failed to listen for ctrl-c: {err}");
                }
                info!("shutting down");
                break;
            }
        }
    }

    service.shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

fn print_batch(batch: &ReadyBatch) {
    for file in &batch.files {
        println!("{}", file.display());
    }
}

pub fn classify(dirs: &[PathBuf]) -> ExitCode {
    let classifier = StatfsClassifier::new();
    let mut status = ExitCode::SUCCESS;
    for dir in dirs {
        if !dir.is_dir() {
            eprintln!("{}: not a directory", dir.display());
            status = ExitCode::FAILURE;
            continue;
        }
        println!("{}\t{}", dir.display(), classifier.classify(dir));
    }
    status
}

pub fn check(files: &[PathBuf]) -> ExitCode {
    let validator = BencodeValidator::new();
    let mut status = ExitCode::SUCCESS;
    for file in files {
        let verdict = if validator.is_valid(file) {
            "valid"
        } else {
            status = ExitCode::FAILURE;
            "invalid"
        };
        println!("{}\t{}", file.display(), verdict);
    }
    status
}
