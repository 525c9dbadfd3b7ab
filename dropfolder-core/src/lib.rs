//! # Dropfolder Core
//!
//! Watches directories for `.torrent` and `.magnet` files and reports the ones
//! that are ready to be added to a download session.
//!
//! ## Overview
//!
//! - **Local directories** are observed through OS change notifications and
//!   rescanned on every change.
//! - **Network directories** (CIFS, NFS, SMB) cannot be trusted to deliver
//!   notifications and are polled on a fixed interval instead.
//! - **Partial files**: a `.torrent` that does not parse yet is retried on a
//!   reconciliation timer and renamed with an `.invalid` suffix once its
//!   retries run out.
//!
//! ## Architecture
//!
//! - [`classify`]: decides how a directory is observed
//! - [`scan`]: directory scanning, metadata validation and partial tracking
//! - [`watch`]: the registry, timers and the control task
//! - [`batch`]: ready batches and their sink
//! - [`fs`]: filesystem seam with real and in-memory implementations
//!
//! ## Examples
//!
//! ```no_run
//! use dropfolder_core::{BencodeValidator, Collaborators, ReadyBatch, WatchConfig, WatchService};
//!
//! async fn watch_downloads() -> dropfolder_core::Result<()> {
//!     let (sink, mut batches) = tokio::sync::mpsc::unbounded_channel::<ReadyBatch>();
//!     let service = WatchService::spawn(
//!         WatchConfig::default(),
//!         Collaborators::system(BencodeValidator::new()),
//!         sink,
//!     );
//!     service.add_path("/srv/downloads/watch")?;
//!
//!     while let Some(batch) = batches.recv().await {
//!         for file in &batch.files {
//!             println!("ready: {}", file.display());
//!         }
//!     }
//!     service.shutdown().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod batch;
pub mod classify;
/// Watcher tuning knobs
pub mod config;
/// Error types
pub mod error;
/// Filesystem access used by scanning and reconciliation
pub mod fs;
pub mod scan;
pub mod watch;

pub use batch::{BatchOrigin, CollectingSink, ReadyBatch, ReadySink};
pub use classify::{FixedClassifier, PathClassifier, StatfsClassifier, WatchMode};
pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use fs::{InMemoryFs, RealFs, WatchFs};
pub use scan::{BencodeValidator, DirectoryScanner, MetadataValidator, PartialTracker};
pub use watch::{Collaborators, DropFolderWatcher, WatchService};
