//! Remote object store backed by an OpenDAL operator
//!
//! Shares are written to `{prefix}/{share_id}`. Restore lists the prefix and
//! downloads every object into this store's staging directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chasm_core::config::StorageConfig;
use chasm_core::types::{RemoteService, RemoteStoreConfig};
use chasm_core::{Share, ShareId};
use opendal::Operator;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::operator::build_remote_operator;
use crate::store::{remove_staging, staging_dir_for, CloudStore};

pub struct RemoteStore {
    name: String,
    kind: &'static str,
    op: Operator,
    prefix: String,
    staging: PathBuf,
}

impl RemoteStore {
    /// Wrap an existing operator.
    pub fn new(name: &str, op: Operator, prefix: &str, staging_root: &Path) -> Self {
        Self {
            name: name.to_string(),
            kind: "remote",
            op,
            prefix: prefix.trim_matches('/').to_string(),
            staging: staging_dir_for(staging_root, "remote"),
        }
    }

    /// Build from a registered store config.
    pub fn from_config(
        cfg: &RemoteStoreConfig,
        storage: &StorageConfig,
        staging_root: &Path,
    ) -> Result<Self> {
        let op = build_remote_operator(cfg, storage, None)
            .with_context(|| format!("building operator for store {}", cfg.name))?;
        let mut store = Self::new(&cfg.name, op, &cfg.prefix, staging_root);
        store.kind = match cfg.service {
            RemoteService::S3 => "s3",
            RemoteService::Memory => "memory",
        };
        Ok(store)
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn key(&self, share_id: &ShareId) -> String {
        if self.prefix.is_empty() {
            share_id.to_string()
        } else {
            format!("{}/{share_id}", self.prefix)
        }
    }

    fn list_dir(&self) -> String {
        if self.prefix.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.prefix)
        }
    }
}

#[async_trait]
impl CloudStore for RemoteStore {
    async fn upload(&self, share: &Share) -> Result<()> {
        let key = self.key(&share.share_id);
        self.op
            .write(&key, share.data.clone())
            .await
            .with_context(|| format!("uploading share: {key}"))?;
        debug!(store = %self.short_description(), key = %key, bytes = share.data.len(), "share uploaded");
        Ok(())
    }

    async fn delete(&self, share_id: &ShareId) -> Result<()> {
        let key = self.key(share_id);
        self.op
            .delete(&key)
            .await
            .with_context(|| format!("deleting share: {key}"))
    }

    async fn restore_to_staging(&self) -> Result<PathBuf> {
        let dir = self.list_dir();
        let entries = self
            .op
            .list(&dir)
            .await
            .with_context(|| format!("listing {dir} on {}", self.short_description()))?;

        remove_staging(&self.staging).await?;
        tokio::fs::create_dir_all(&self.staging)
            .await
            .with_context(|| format!("creating staging dir: {}", self.staging.display()))?;

        let mut fetched = 0usize;
        for entry in entries {
            let entry_path = entry.path();
            let name = entry_path
                .strip_prefix(dir.trim_start_matches('/'))
                .unwrap_or(entry_path);
            // skip directory markers and anything nested below the prefix
            if name.is_empty() || name.contains('/') {
                continue;
            }
            let data = self
                .op
                .read(entry.path())
                .await
                .with_context(|| format!("downloading share: {}", entry.path()))?;
            let dest = self.staging.join(name);
            tokio::fs::write(&dest, data.to_vec())
                .await
                .with_context(|| format!("writing staged share: {}", dest.display()))?;
            fetched += 1;
        }

        debug!(store = %self.short_description(), shares = fetched, staging = %self.staging.display(), "staged");
        Ok(self.staging.clone())
    }

    async fn clean(&self) -> Result<()> {
        remove_staging(&self.staging).await
    }

    fn description(&self) -> String {
        let info = self.op.info();
        format!(
            "Remote store {} ({} {}, prefix {:?})",
            self.name,
            info.scheme(),
            info.name(),
            self.prefix
        )
    }

    fn short_description(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}
