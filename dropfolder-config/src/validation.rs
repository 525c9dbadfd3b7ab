use std::path::Path;

use dropfolder_core::WatchConfig;
use thiserror::Error;

/// Settings that would make the watcher misbehave.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("watch.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("watch.invalid_suffix must not be empty")]
    EmptyInvalidSuffix,

    #[error("watch.{field} must not be empty")]
    EmptyExtension { field: &'static str },

    #[error("watch.metadata_extension and watch.magnet_extension are both '{extension}'")]
    SharedExtension { extension: String },

    #[error("watch.invalid_suffix '{suffix}' leaves renamed files matching '.{extension}'")]
    SuffixKeepsPattern { suffix: String, extension: String },
}

/// Check a [`WatchConfig`] before it reaches the watcher.
pub fn validate_watch_config(config: &WatchConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms == 0 {
        return Err(ConfigError::ZeroPollInterval);
    }
    if config.invalid_suffix.is_empty() {
        return Err(ConfigError::EmptyInvalidSuffix);
    }

    let metadata = config.metadata_ext().to_ascii_lowercase();
    let magnet = config.magnet_ext().to_ascii_lowercase();
    if metadata.is_empty() {
        return Err(ConfigError::EmptyExtension {
            field: "metadata_extension",
        });
    }
    if magnet.is_empty() {
        return Err(ConfigError::EmptyExtension {
            field: "magnet_extension",
        });
    }
    if metadata == magnet {
        return Err(ConfigError::SharedExtension { extension: metadata });
    }

    // An invalidated file must stop matching, or it would be picked up again.
    let renamed = format!("partial.{metadata}{}", config.invalid_suffix);
    if let Some(ext) = Path::new(&renamed).extension().and_then(|ext| ext.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if ext == metadata || ext == magnet {
            return Err(ConfigError::SuffixKeepsPattern {
                suffix: config.invalid_suffix.clone(),
                extension: ext,
            });
        }
    }
    Ok(())
}
