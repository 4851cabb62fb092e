//! Per-operation outcome reports
//!
//! Pipelines never fail silently: every path that was tracked, skipped or
//! failed ends up in one of these, together with per-store failures.

use chasm_core::{ChasmError, ShareId};
use std::path::PathBuf;

/// A path that was not processed, with the reason. The operation went on.
#[derive(Debug)]
pub struct PathFailure {
    pub path: PathBuf,
    pub error: ChasmError,
}

/// A file whose shares were (re)distributed.
#[derive(Debug)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub share_id: ShareId,
    pub fingerprint: String,
    /// Stores that did not accept their share
    pub store_failures: Vec<ChasmError>,
}

#[derive(Debug, Default)]
pub struct AddReport {
    pub files: Vec<TrackedFile>,
    pub dirs: Vec<PathBuf>,
    /// Paths excluded by `.chasmignore`, each as `IgnoredPath`
    pub ignored: Vec<PathFailure>,
    pub failures: Vec<PathFailure>,
    /// Stores that did not accept the updated `.chasm` share
    pub metadata_failures: Vec<ChasmError>,
}

impl AddReport {
    /// Nothing failed anywhere.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.metadata_failures.is_empty()
            && self.files.iter().all(|f| f.store_failures.is_empty())
    }
}

/// A file that was untracked.
#[derive(Debug)]
pub struct DeletedFile {
    pub path: PathBuf,
    pub share_id: ShareId,
    /// Stores that could not delete their share
    pub store_failures: Vec<ChasmError>,
}

#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<DeletedFile>,
    pub dirs: Vec<PathBuf>,
    pub ignored: Vec<PathFailure>,
    /// The target when it was neither a tracked file nor a tracked dir
    pub not_tracked: Vec<PathFailure>,
    pub failures: Vec<PathFailure>,
    pub metadata_failures: Vec<ChasmError>,
}

impl DeleteReport {
    /// Whether the state changed (and was persisted).
    pub fn mutated(&self) -> bool {
        !self.deleted.is_empty() || !self.dirs.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.not_tracked.is_empty()
            && self.metadata_failures.is_empty()
            && self.deleted.iter().all(|f| f.store_failures.is_empty())
    }
}

/// A manifest entry that was not materialized.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: ChasmError,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}
