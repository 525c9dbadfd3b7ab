//! Configuration loading for dropfolder.
//!
//! Reads a [`DropFolderConfig`] from an explicit file, the
//! `DROPFOLDER_CONFIG_PATH` / `DROPFOLDER_CONFIG_JSON` environment variables
//! or a default file next to the process, and validates the watch settings
//! before they reach the watcher.

#![allow(missing_docs)]

pub mod models;
pub mod validation;

pub use models::{CONFIG_JSON_VAR, CONFIG_PATH_VAR, ConfigSource, DropFolderConfig};
pub use validation::{ConfigError, validate_watch_config};
