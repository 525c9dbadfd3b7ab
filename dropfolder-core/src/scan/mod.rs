//! Directory scanning and partial file reconciliation.
//!
//! The scanner lists one directory, the validator judges metadata files, and
//! the partial tracker keeps retrying the ones that are not usable yet.

pub mod partial;
pub mod scanner;
pub mod validate;

pub use partial::{PartialTracker, ReconcileOutcome, Transition, invalid_path, transition};
pub use scanner::{CandidateKind, DirectoryScanner, ScanOutcome};
pub use validate::{BencodeValidator, MetadataValidator};
