use anyhow::{Context, anyhow};
use dropfolder_core::WatchConfig;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::validation::validate_watch_config;

/// Environment variable naming a TOML or JSON config file.
pub const CONFIG_PATH_VAR: &str = "DROPFOLDER_CONFIG_PATH";
/// Environment variable holding an inline JSON config.
pub const CONFIG_JSON_VAR: &str = "DROPFOLDER_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &[
    "dropfolder.toml",
    "dropfolder.json",
    "config/dropfolder.toml",
    "config/dropfolder.json",
];

/// Source that produced the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Everything a watch-folder process needs to start.
///
/// ```toml
/// directories = ["/srv/watch", "/mnt/nas/watch"]
/// log_filter = "dropfolder_core=debug"
///
/// [watch]
/// poll_interval_ms = 5000
/// max_partial_retries = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DropFolderConfig {
    /// Polling cadence, retry ceiling, suffix and extensions.
    pub watch: WatchConfig,
    /// Directories registered at startup, in addition to any given on the
    /// command line. Missing directories are skipped by the watcher.
    pub directories: Vec<PathBuf>,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl DropFolderConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$DROPFOLDER_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$DROPFOLDER_CONFIG_JSON` (inline JSON),
    /// 3) the first default file found in the working directory,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        let cwd = env::current_dir().context("failed to resolve working directory")?;
        Self::load_with(|key| env::var(key).ok(), &cwd)
    }

    /// [`Self::load_from_env`] with an explicit variable lookup and base
    /// directory for the default file candidates.
    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, ConfigSource)> {
        if let Some(path_str) = lookup(CONFIG_PATH_VAR)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str.trim());
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_VAR)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_VAR}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base_dir) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        debug!("no dropfolder config found, using defaults");
        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read dropfolder config from {}", path.display())
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents).map_err(|err| {
                anyhow!("invalid dropfolder config {}: {}", path.display(), err)
            })?,
            Some("toml") | Some("tml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid dropfolder config {}: {}", path.display(), err)
            })?,
            _ => return Self::parse_from_str(&contents, &path.display().to_string()),
        };
        config
            .validate()
            .with_context(|| format!("invalid dropfolder config {}", path.display()))?;
        Ok(config)
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // TOML first, JSON as a fallback.
        let config: Self = toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse dropfolder config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })?;
        config
            .validate()
            .with_context(|| format!("invalid dropfolder config {origin}"))?;
        Ok(config)
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid dropfolder config json: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the watcher cannot honour.
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        validate_watch_config(&self.watch)
    }

    fn find_default_file(base_dir: &Path) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| base_dir.join(candidate))
            .find(|path| path.is_file())
    }
}
