use std::path::PathBuf;
use thiserror::Error;

use crate::types::ShareId;

pub type ChasmResult<T> = Result<T, ChasmError>;

#[derive(Debug, Error)]
pub enum ChasmError {
    #[error("cannot access {}: {source}", .path.display())]
    NotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {}: {source}", .path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} matches a pattern in .chasmignore", .0.display())]
    IgnoredPath(PathBuf),

    #[error("{} is not tracked", .0.display())]
    NotTracked(PathBuf),

    #[error("{} holds chasm metadata and cannot be untracked", .0.display())]
    Reserved(PathBuf),

    #[error("upload of share {share_id} to {store} failed: {reason}")]
    BackendUpload {
        store: String,
        share_id: ShareId,
        reason: String,
    },

    #[error("delete of share {share_id} from {store} failed: {reason}")]
    BackendDelete {
        store: String,
        share_id: ShareId,
        reason: String,
    },

    #[error("{store} could not stage its shares: {reason}")]
    StagingFailed { store: String, reason: String },

    #[error("only {found} of {needed} shares available for {share_id}")]
    InsufficientShares {
        share_id: ShareId,
        found: usize,
        needed: usize,
    },

    #[error("fingerprint mismatch for {}: expected {expected}, got {actual}", .path.display())]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("setup incomplete: {registered} store(s) registered, at least 2 are required")]
    SetupIncomplete { registered: usize },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
