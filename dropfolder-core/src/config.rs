use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Extension (without the dot) of bencoded torrent metadata files.
pub const DEFAULT_METADATA_EXTENSION: &str = "torrent";
/// Extension (without the dot) of files holding a single magnet link.
pub const DEFAULT_MAGNET_EXTENSION: &str = "magnet";
/// Suffix appended to metadata files that never became valid.
pub const DEFAULT_INVALID_SUFFIX: &str = ".invalid";
/// Cadence of network directory polling and partial file reconciliation.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
/// Reconciliation ticks a partial file survives before it is invalidated.
pub const DEFAULT_MAX_PARTIAL_RETRIES: u32 = 5;
/// Window in which change notifications for one directory collapse into a
/// single rescan.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Knobs that tune the watch folder.
///
/// All fields carry defaults so a config file only needs to mention the
/// values it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Interval (ms) between network directory polls. The same interval is
    /// used to re-check partial files.
    pub poll_interval_ms: u64,
    /// Reconciliation ticks a partial file is retried before being renamed
    /// with `invalid_suffix` and forgotten.
    pub max_partial_retries: u32,
    /// Window (ms) after the first change notification for a directory in
    /// which further notifications for it are folded into the same rescan.
    /// `0` rescans on every notification.
    pub debounce_ms: u64,
    /// Suffix appended to the file name of metadata files that never
    /// validated.
    pub invalid_suffix: String,
    /// Extension treated as torrent metadata (validated before reporting).
    pub metadata_extension: String,
    /// Extension treated as a magnet link (reported without validation).
    pub magnet_extension: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_partial_retries: DEFAULT_MAX_PARTIAL_RETRIES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            invalid_suffix: DEFAULT_INVALID_SUFFIX.to_string(),
            metadata_extension: DEFAULT_METADATA_EXTENSION.to_string(),
            magnet_extension: DEFAULT_MAGNET_EXTENSION.to_string(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Extensions with any leading dot removed, as matched by the scanner.
    pub fn metadata_ext(&self) -> &str {
        self.metadata_extension.trim_start_matches('.')
    }

    pub fn magnet_ext(&self) -> &str {
        self.magnet_extension.trim_start_matches('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let cfg: WatchConfig =
            serde_json::from_str(r#"{ "poll_interval_ms": 2500 }"#).unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(2500));
        assert_eq!(cfg.max_partial_retries, DEFAULT_MAX_PARTIAL_RETRIES);
        assert_eq!(cfg.invalid_suffix, ".invalid");
        assert_eq!(cfg.debounce_window(), Duration::from_millis(250));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = WatchConfig {
            poll_interval_ms: 0,
            ..WatchConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn leading_dots_are_ignored() {
        let cfg = WatchConfig {
            metadata_extension: ".torrent".into(),
            ..WatchConfig::default()
        };
        assert_eq!(cfg.metadata_ext(), "torrent");
        assert_eq!(cfg.magnet_ext(), "magnet");
    }
}
