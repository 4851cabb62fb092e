//! Restore pipeline
//!
//! Local state is not trusted here. Every store stages its shares, the
//! `.chasm` manifest is rebuilt from those staged pieces, and only then are
//! the manifest's directories and files recreated. Missing the manifest from
//! any store aborts the run; a file missing a piece or failing its
//! fingerprint check is skipped and reported.

use chasm_core::{ChasmError, ChasmResult, ShareId};
use chasm_shares::{fingerprint, fingerprint_matches};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::engine::Coordinator;
use crate::report::{RestoreReport, SkippedFile};
use crate::state::ChasmState;

/// Reported as the actual fingerprint when the pieces cannot be combined.
pub const UNCOMBINABLE: &str = "<uncombinable>";

impl Coordinator {
    /// Rebuild every tracked directory and file from the stores.
    pub async fn restore(&mut self) -> ChasmResult<RestoreReport> {
        self.ensure_setup()?;

        let mut staged = Vec::with_capacity(self.stores.len());
        for store in &self.stores {
            match store.restore_to_staging().await {
                Ok(dir) => staged.push(dir),
                Err(e) => {
                    let store = store.short_description();
                    error!(store = %store, "staging failed, aborting restore: {e:#}");
                    self.clean_staging().await;
                    return Err(ChasmError::StagingFailed {
                        store,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        let result = self.reconstruct(&staged).await;
        self.clean_staging().await;

        match &result {
            Ok(report) => info!(
                restored = report.restored.len(),
                dirs = report.directories.len(),
                skipped = report.skipped.len(),
                "restore complete"
            ),
            Err(e) => error!("restore failed: {e}"),
        }
        result
    }

    async fn reconstruct(&mut self, staged: &[PathBuf]) -> ChasmResult<RestoreReport> {
        let pieces = self.gather(staged, &ShareId::metadata()).await?;
        let manifest_bytes = self
            .scheme
            .combine(&pieces)
            .map_err(|e| ChasmError::Manifest(format!("combining metadata shares: {e:#}")))?;
        let manifest = ChasmState::from_json(&manifest_bytes)?;
        info!(
            files = manifest.tracked_files(),
            dirs = manifest.dirs().count(),
            "manifest recovered"
        );

        let mut report = RestoreReport::default();

        // Every manifest record joins the live state, restored or not.
        for dir in manifest.dirs() {
            self.state.insert_dir(dir);
            match tokio::fs::create_dir_all(dir).await {
                Ok(()) => report.directories.push(dir.to_path_buf()),
                Err(source) => {
                    warn!(path = %dir.display(), "cannot create directory: {source}");
                    report.skipped.push(SkippedFile {
                        path: dir.to_path_buf(),
                        reason: ChasmError::WriteFailure {
                            path: dir.to_path_buf(),
                            source,
                        },
                    });
                }
            }
        }

        for (path, record) in manifest.files() {
            if record.is_metadata() {
                continue;
            }
            self.state.insert_file(path, record.clone());
            match self.restore_file(path, &record.share_id, &record.hash, staged).await {
                Ok(()) => report.restored.push(path.to_path_buf()),
                Err(reason) => {
                    warn!(path = %path.display(), share_id = %record.share_id, "skipped: {reason}");
                    report.skipped.push(SkippedFile {
                        path: path.to_path_buf(),
                        reason,
                    });
                }
            }
        }

        self.state.save()?;
        Ok(report)
    }

    async fn restore_file(
        &self,
        path: &Path,
        share_id: &ShareId,
        expected: &str,
        staged: &[PathBuf],
    ) -> ChasmResult<()> {
        let pieces = self.gather(staged, share_id).await?;
        let data = self.scheme.combine(&pieces).map_err(|e| {
            warn!(path = %path.display(), share_id = %share_id, "pieces do not combine: {e:#}");
            ChasmError::IntegrityMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual: UNCOMBINABLE.to_string(),
            }
        })?;
        if !fingerprint_matches(expected, &data) {
            return Err(ChasmError::IntegrityMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual: fingerprint(&data),
            });
        }
        write_atomic(path, &data)
            .await
            .map_err(|source| ChasmError::WriteFailure {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), bytes = data.len(), "restored");
        Ok(())
    }

    /// Read the piece for `share_id` from every staging dir.
    async fn gather(&self, staged: &[PathBuf], share_id: &ShareId) -> ChasmResult<Vec<Vec<u8>>> {
        if !share_id.is_valid_file_name() {
            return Err(ChasmError::Manifest(format!(
                "invalid share id in manifest: {share_id:?}"
            )));
        }

        let mut pieces = Vec::with_capacity(staged.len());
        for dir in staged {
            let piece_path = dir.join(share_id.as_str());
            match tokio::fs::read(&piece_path).await {
                Ok(data) => pieces.push(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ChasmError::ReadFailure {
                        path: piece_path,
                        source,
                    })
                }
            }
        }

        if pieces.len() < self.stores.len() {
            return Err(ChasmError::InsufficientShares {
                share_id: share_id.clone(),
                found: pieces.len(),
                needed: self.stores.len(),
            });
        }
        Ok(pieces)
    }

    async fn clean_staging(&self) {
        for store in &self.stores {
            if let Err(e) = store.clean().await {
                warn!(store = %store.short_description(), "cleaning staging failed: {e:#}");
            }
        }
    }
}

/// Write `data` to `path` via a sibling temp file, creating parents.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".chasm_restore");
    let tmp = path.with_file_name(tmp_name);
    let written = match tokio::fs::write(&tmp, data).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    written
}
