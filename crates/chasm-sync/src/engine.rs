//! Add and delete pipelines
//!
//! The coordinator owns the state and the positional store set. Backend calls
//! are awaited one store at a time; a failing store is recorded in the
//! operation report and the remaining stores are still attempted. State is
//! persisted once per top-level operation, after every backend call of that
//! operation has settled.

use chasm_core::config::StorageConfig;
use chasm_core::types::{FolderStoreConfig, RemoteStoreConfig};
use chasm_core::{ChasmError, ChasmResult, FileShare, Share, ShareId};
use chasm_shares::{fingerprint, ShareScheme, XorScheme};
use chasm_storage::{build_stores, CloudStore, FolderStore, RemoteStore};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::ignore::IgnoreFilter;
use crate::paths::absolutize;
use crate::report::{AddReport, DeleteReport, DeletedFile, PathFailure, TrackedFile};
use crate::state::ChasmState;

pub struct Coordinator {
    pub(crate) state: ChasmState,
    pub(crate) stores: Vec<Box<dyn CloudStore>>,
    pub(crate) scheme: Box<dyn ShareScheme>,
    pub(crate) ignore: IgnoreFilter,
    storage: StorageConfig,
}

impl Coordinator {
    /// Initialize or load the root and build its registered stores.
    pub fn open(root: &Path, storage: &StorageConfig) -> ChasmResult<Self> {
        let root = absolutize(root).map_err(|source| ChasmError::NotAccessible {
            path: root.to_path_buf(),
            source,
        })?;
        let state = ChasmState::init_or_load(&root)?;
        let stores = build_stores(&state.store_configs(), storage)?;
        info!(
            root = %root.display(),
            stores = stores.len(),
            tracked = state.tracked_files(),
            "coordinator ready"
        );
        let mut coordinator = Self::from_parts(state, stores, Box::new(XorScheme));
        coordinator.storage = storage.clone();
        Ok(coordinator)
    }

    /// Assemble a coordinator from an explicit store set and scheme.
    ///
    /// `stores` must be in the state's positional order.
    pub fn from_parts(
        state: ChasmState,
        stores: Vec<Box<dyn CloudStore>>,
        scheme: Box<dyn ShareScheme>,
    ) -> Self {
        let ignore = IgnoreFilter::for_root(state.root());
        Self {
            state,
            stores,
            scheme,
            ignore,
            storage: StorageConfig::default(),
        }
    }

    pub fn state(&self) -> &ChasmState {
        &self.state
    }

    pub fn stores(&self) -> &[Box<dyn CloudStore>] {
        &self.stores
    }

    pub fn registered_services(&self) -> usize {
        self.stores.len()
    }

    pub(crate) fn ensure_setup(&self) -> ChasmResult<()> {
        if self.stores.len() < 2 {
            return Err(ChasmError::SetupIncomplete {
                registered: self.stores.len(),
            });
        }
        Ok(())
    }

    // ── Registration ─────────────────────────────────────────────────────

    /// Append a local mirror store. It takes the position after the last
    /// folder store, shifting every remote store by one.
    pub fn register_folder_store(&mut self, cfg: FolderStoreConfig) -> ChasmResult<()> {
        if self.state.folder_stores.iter().any(|f| f.path == cfg.path) {
            return Err(ChasmError::Config(format!(
                "folder store already registered: {}",
                cfg.path.display()
            )));
        }
        let position = self.state.folder_stores.len().min(self.stores.len());
        let store = FolderStore::new(&cfg, &self.storage.staging_root());
        self.warn_positions_shift(&store.short_description());
        self.stores.insert(position, Box::new(store));
        self.state.folder_stores.push(cfg);
        self.state.save()?;
        Ok(())
    }

    /// Append a remote store at the end of the positional order.
    pub fn register_remote_store(&mut self, cfg: RemoteStoreConfig) -> ChasmResult<()> {
        if self.state.remote_stores.iter().any(|r| r.name == cfg.name) {
            return Err(ChasmError::Config(format!(
                "remote store already registered: {}",
                cfg.name
            )));
        }
        let store = RemoteStore::from_config(&cfg, &self.storage, &self.storage.staging_root())?;
        self.warn_positions_shift(&store.short_description());
        self.stores.push(Box::new(store));
        self.state.remote_stores.push(cfg);
        self.state.save()?;
        Ok(())
    }

    fn warn_positions_shift(&self, added: &str) {
        let tracked = self.state.tracked_files();
        if tracked > 0 {
            warn!(
                store = %added,
                tracked,
                "store set changed: existing shares were split for {} stores; re-add tracked paths to redistribute",
                self.stores.len()
            );
        } else {
            info!(store = %added, "store registered");
        }
    }

    // ── Add ──────────────────────────────────────────────────────────────

    /// Track `path` (recursively for directories) and distribute its shares.
    pub async fn add(&mut self, path: &Path) -> ChasmResult<AddReport> {
        self.ensure_setup()?;
        let top = absolutize(path).map_err(|source| ChasmError::NotAccessible {
            path: path.to_path_buf(),
            source,
        })?;

        let mut report = AddReport::default();
        let mut queue = VecDeque::from([top.clone()]);
        // Canonical directories already walked; symlinks are followed.
        let mut visited: HashSet<PathBuf> = HashSet::new();

        while let Some(p) = queue.pop_front() {
            if let Some(rule) = self.ignore.matching_rule(&p) {
                debug!(path = %p.display(), rule = %rule, "ignored");
                report.ignored.push(PathFailure {
                    error: ChasmError::IgnoredPath(p.clone()),
                    path: p,
                });
                continue;
            }

            let meta = match tokio::fs::metadata(&p).await {
                Ok(m) => m,
                Err(source) => {
                    warn!(path = %p.display(), "cannot stat: {source}");
                    report.failures.push(PathFailure {
                        error: ChasmError::NotAccessible {
                            path: p.clone(),
                            source,
                        },
                        path: p,
                    });
                    continue;
                }
            };

            if meta.is_dir() {
                match tokio::fs::canonicalize(&p).await {
                    Ok(real) if !visited.insert(real.clone()) => {
                        debug!(path = %p.display(), target = %real.display(), "directory already walked");
                        continue;
                    }
                    Ok(_) => {}
                    Err(source) => {
                        report.failures.push(PathFailure {
                            error: ChasmError::NotAccessible {
                                path: p.clone(),
                                source,
                            },
                            path: p,
                        });
                        continue;
                    }
                }
                self.state.insert_dir(&p);
                match read_children(&p).await {
                    Ok(children) => queue.extend(children),
                    Err(source) => report.failures.push(PathFailure {
                        error: ChasmError::NotAccessible {
                            path: p.clone(),
                            source,
                        },
                        path: p.clone(),
                    }),
                }
                debug!(path = %p.display(), "directory tracked");
                report.dirs.push(p);
            } else if meta.is_file() {
                match self.add_file(&p).await {
                    Ok(tracked) => report.files.push(tracked),
                    Err(error) => {
                        warn!(path = %p.display(), "add failed: {error}");
                        report.failures.push(PathFailure { path: p, error });
                    }
                }
            } else {
                report.failures.push(PathFailure {
                    error: ChasmError::NotAccessible {
                        path: p.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            "not a regular file or directory",
                        ),
                    },
                    path: p,
                });
            }
        }

        let mutated = !report.files.is_empty() || !report.dirs.is_empty();
        if mutated && top != self.state.metadata_path() {
            report.metadata_failures = self.persist().await?;
        }

        info!(
            path = %top.display(),
            files = report.files.len(),
            dirs = report.dirs.len(),
            ignored = report.ignored.len(),
            failures = report.failures.len(),
            "add complete"
        );
        Ok(report)
    }

    async fn add_file(&mut self, path: &Path) -> ChasmResult<TrackedFile> {
        let is_metadata = path == self.state.metadata_path();
        let share_id = if is_metadata {
            ShareId::metadata()
        } else if path == self.state.ignore_path() {
            ShareId::ignore_rules()
        } else {
            self.state
                .file(path)
                .map(|rec| rec.share_id.clone())
                .unwrap_or_else(ShareId::random)
        };

        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ChasmError::ReadFailure {
                path: path.to_path_buf(),
                source,
            })?;
        let hash = if is_metadata {
            String::new()
        } else {
            fingerprint(&data)
        };
        let pieces = self.split(&data)?;

        self.state.insert_file(
            path,
            FileShare {
                share_id: share_id.clone(),
                hash: hash.clone(),
            },
        );
        let store_failures = self.upload_pieces(&share_id, pieces).await;

        info!(
            path = %path.display(),
            share_id = %share_id,
            bytes = data.len(),
            failed_stores = store_failures.len(),
            "tracked"
        );
        Ok(TrackedFile {
            path: path.to_path_buf(),
            share_id,
            fingerprint: hash,
            store_failures,
        })
    }

    // ── Delete ───────────────────────────────────────────────────────────

    /// Untrack `path` (with everything beneath it, for directories) and
    /// delete its shares from every store.
    pub async fn delete(&mut self, path: &Path) -> ChasmResult<DeleteReport> {
        self.ensure_setup()?;
        let target = absolutize(path).map_err(|source| ChasmError::NotAccessible {
            path: path.to_path_buf(),
            source,
        })?;

        let mut report = DeleteReport::default();
        if let Some(rule) = self.ignore.matching_rule(&target) {
            debug!(path = %target.display(), rule = %rule, "ignored");
            report.ignored.push(PathFailure {
                error: ChasmError::IgnoredPath(target.clone()),
                path: target,
            });
            return Ok(report);
        }

        if target == self.state.metadata_path() {
            report.failures.push(PathFailure {
                error: ChasmError::Reserved(target.clone()),
                path: target,
            });
            return Ok(report);
        }

        if self.state.is_dir(&target) {
            for (file, record) in self.state.files_under(&target) {
                let deleted = self.untrack_file(&file, record.share_id).await;
                report.deleted.push(deleted);
            }
            for dir in self.state.dirs_within(&target) {
                self.state.remove_dir(&dir);
                report.dirs.push(dir);
            }
        } else if let Some(record) = self.state.file(&target).cloned() {
            let deleted = self.untrack_file(&target, record.share_id).await;
            report.deleted.push(deleted);
        } else {
            info!(path = %target.display(), "not tracked");
            report.not_tracked.push(PathFailure {
                error: ChasmError::NotTracked(target.clone()),
                path: target,
            });
            return Ok(report);
        }

        report.metadata_failures = self.persist().await?;
        info!(
            path = %target.display(),
            files = report.deleted.len(),
            dirs = report.dirs.len(),
            "delete complete"
        );
        Ok(report)
    }

    async fn untrack_file(&mut self, path: &Path, share_id: ShareId) -> DeletedFile {
        let mut store_failures = Vec::new();
        for store in &self.stores {
            if let Err(e) = store.delete(&share_id).await {
                let store = store.short_description();
                warn!(store = %store, share_id = %share_id, "delete failed: {e:#}");
                store_failures.push(ChasmError::BackendDelete {
                    store,
                    share_id: share_id.clone(),
                    reason: format!("{e:#}"),
                });
            }
        }
        self.state.remove_file(path);
        info!(path = %path.display(), share_id = %share_id, "untracked");
        DeletedFile {
            path: path.to_path_buf(),
            share_id,
            store_failures,
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Save the state locally, then distribute it under the reserved
    /// metadata id. Returns the stores that rejected their share.
    pub async fn persist(&mut self) -> ChasmResult<Vec<ChasmError>> {
        let json = self.state.save()?;
        let pieces = self.split(&json)?;
        let failures = self.upload_pieces(&ShareId::metadata(), pieces).await;
        debug!(bytes = json.len(), failed_stores = failures.len(), "state persisted");
        Ok(failures)
    }

    // ── Share distribution ───────────────────────────────────────────────

    fn split(&self, data: &[u8]) -> ChasmResult<Vec<Vec<u8>>> {
        let n = self.stores.len();
        let pieces = self.scheme.split(data, n)?;
        if pieces.len() != n {
            return Err(ChasmError::Other(anyhow::anyhow!(
                "scheme produced {} shares for {n} stores",
                pieces.len()
            )));
        }
        Ok(pieces)
    }

    /// Upload piece `i` to store `i`.
    async fn upload_pieces(&self, share_id: &ShareId, pieces: Vec<Vec<u8>>) -> Vec<ChasmError> {
        let mut failures = Vec::new();
        for (store, data) in self.stores.iter().zip(pieces) {
            let share = Share {
                share_id: share_id.clone(),
                data,
            };
            if let Err(e) = store.upload(&share).await {
                let store = store.short_description();
                warn!(store = %store, share_id = %share_id, "upload failed: {e:#}");
                failures.push(ChasmError::BackendUpload {
                    store,
                    share_id: share_id.clone(),
                    reason: format!("{e:#}"),
                });
            }
        }
        failures
    }
}

/// Direct children of `dir`, sorted by name.
async fn read_children(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}
