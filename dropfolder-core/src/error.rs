use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to subscribe to {path}: {source}")]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watch service is no longer running")]
    ServiceClosed,
}

pub type Result<T> = std::result::Result<T, WatchError>;
