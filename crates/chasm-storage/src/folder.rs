//! Local mirror folder store
//!
//! Shares are plain files named by share id directly under the mirror
//! directory. The mirror can be any mounted location: a USB drive, a NAS
//! export, a folder another sync client watches.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chasm_core::types::FolderStoreConfig;
use chasm_core::{Share, ShareId};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::{remove_staging, staging_dir_for, CloudStore};

pub struct FolderStore {
    mirror: PathBuf,
    staging: PathBuf,
}

impl FolderStore {
    pub fn new(cfg: &FolderStoreConfig, staging_root: &Path) -> Self {
        Self {
            mirror: cfg.path.clone(),
            staging: staging_dir_for(staging_root, "folder"),
        }
    }

    pub fn mirror(&self) -> &Path {
        &self.mirror
    }

    /// Where the share for `share_id` lives in the mirror.
    pub fn share_path(&self, share_id: &ShareId) -> PathBuf {
        self.mirror.join(share_id.as_str())
    }
}

#[async_trait]
impl CloudStore for FolderStore {
    async fn upload(&self, share: &Share) -> Result<()> {
        if !share.share_id.is_valid_file_name() {
            bail!("invalid share id: {:?}", share.share_id.as_str());
        }
        tokio::fs::create_dir_all(&self.mirror)
            .await
            .with_context(|| format!("creating mirror dir: {}", self.mirror.display()))?;

        // Atomic write: temp file in the mirror, then rename over the share
        let dest = self.share_path(&share.share_id);
        let tmp = self
            .mirror
            .join(format!(".{}.chasm_tmp", share.share_id));
        tokio::fs::write(&tmp, &share.data)
            .await
            .with_context(|| format!("writing tmp: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &dest)
            .await
            .with_context(|| format!("renaming to: {}", dest.display()))?;

        debug!(store = %self.short_description(), share_id = %share.share_id, bytes = share.data.len(), "share stored");
        Ok(())
    }

    async fn delete(&self, share_id: &ShareId) -> Result<()> {
        let path = self.share_path(share_id);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("removing share: {}", path.display()))
    }

    async fn restore_to_staging(&self) -> Result<PathBuf> {
        if !tokio::fs::metadata(&self.mirror)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            bail!("mirror directory not found: {}", self.mirror.display());
        }

        remove_staging(&self.staging).await?;
        tokio::fs::create_dir_all(&self.staging)
            .await
            .with_context(|| format!("creating staging dir: {}", self.staging.display()))?;

        let mut copied = 0usize;
        let mut entries = tokio::fs::read_dir(&self.mirror)
            .await
            .with_context(|| format!("reading mirror dir: {}", self.mirror.display()))?;
        while let Some(entry) = entries.next_entry().await.context("reading mirror entry")? {
            if !entry.file_type().await.context("stat mirror entry")?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(".chasm_tmp") {
                continue;
            }
            let dest = self.staging.join(&name);
            tokio::fs::copy(entry.path(), &dest)
                .await
                .with_context(|| format!("staging {}", entry.path().display()))?;
            copied += 1;
        }

        debug!(store = %self.short_description(), shares = copied, staging = %self.staging.display(), "staged");
        Ok(self.staging.clone())
    }

    async fn clean(&self) -> Result<()> {
        remove_staging(&self.staging).await
    }

    fn description(&self) -> String {
        format!("Folder store mirroring shares into {}", self.mirror.display())
    }

    fn short_description(&self) -> String {
        format!("folder:{}", self.mirror.display())
    }
}
