pub mod dropfolder;

pub use dropfolder::{CONFIG_JSON_VAR, CONFIG_PATH_VAR, ConfigSource, DropFolderConfig};
