use anyhow::Result;
use async_trait::async_trait;
use chasm_core::config::StorageConfig;
use chasm_core::{Share, ShareId, StoreConfig};
use std::path::PathBuf;

use crate::folder::FolderStore;
use crate::remote::RemoteStore;

/// Capability set every storage backend provides.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Store one share under its share id, replacing any previous version.
    async fn upload(&self, share: &Share) -> Result<()>;

    /// Remove the share stored under `share_id`.
    async fn delete(&self, share_id: &ShareId) -> Result<()>;

    /// Download every share this store holds into a private local staging
    /// directory (one file per share, named by share id) and return it.
    async fn restore_to_staging(&self) -> Result<PathBuf>;

    /// Purge the staging directory.
    async fn clean(&self) -> Result<()>;

    fn description(&self) -> String;

    fn short_description(&self) -> String;
}

/// Build the store set in positional order.
///
/// `configs` must already be in enumeration order (folder stores first, then
/// remote stores); share `i` of every split is uploaded to element `i`.
pub fn build_stores(
    configs: &[StoreConfig],
    storage: &StorageConfig,
) -> Result<Vec<Box<dyn CloudStore>>> {
    let staging_root = storage.staging_root();
    let mut stores: Vec<Box<dyn CloudStore>> = Vec::with_capacity(configs.len());
    for cfg in configs {
        match cfg {
            StoreConfig::Folder(folder) => {
                stores.push(Box::new(FolderStore::new(folder, &staging_root)));
            }
            StoreConfig::Remote(remote) => {
                stores.push(Box::new(RemoteStore::from_config(
                    remote,
                    storage,
                    &staging_root,
                )?));
            }
        }
    }
    Ok(stores)
}

/// A fresh staging directory path for one store instance.
pub(crate) fn staging_dir_for(staging_root: &std::path::Path, kind: &str) -> PathBuf {
    staging_root.join(format!("{kind}-{}", uuid::Uuid::new_v4().simple()))
}

/// Remove a staging directory if present.
pub(crate) async fn remove_staging(dir: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::anyhow!(
            "removing staging dir {}: {e}",
            dir.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chasm_core::types::{FolderStoreConfig, RemoteService, RemoteStoreConfig};

    #[test]
    fn build_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            staging_dir: Some(dir.path().join("staging")),
            enforce_tls: false,
        };
        let configs = vec![
            StoreConfig::Folder(FolderStoreConfig {
                path: dir.path().join("a"),
            }),
            StoreConfig::Folder(FolderStoreConfig {
                path: dir.path().join("b"),
            }),
            StoreConfig::Remote(RemoteStoreConfig {
                name: "mem".into(),
                service: RemoteService::Memory,
                endpoint: String::new(),
                region: String::new(),
                bucket: String::new(),
                prefix: "chasm".into(),
            }),
        ];

        let stores = build_stores(&configs, &storage).unwrap();
        let names: Vec<String> = stores.iter().map(|s| s.short_description()).collect();
        assert_eq!(names.len(), 3);
        assert!(names[0].ends_with("/a"));
        assert!(names[1].ends_with("/b"));
        assert_eq!(names[2], "memory:mem");
    }

    #[test]
    fn staging_dirs_are_unique() {
        let root = std::path::Path::new("/tmp/x");
        assert_ne!(staging_dir_for(root, "folder"), staging_dir_for(root, "folder"));
    }
}
