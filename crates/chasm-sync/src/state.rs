//! Coordinator state: registered stores, tracked files, tracked directories.
//!
//! Persisted as pretty JSON at `<root>/.chasm`, written atomically via
//! temp+rename. The state file is itself a tracked entry (reserved share id
//! `.chasm`, empty fingerprint) so it travels through the same split/upload
//! path as user files and can be rebuilt from the stores alone.

use chasm_core::types::{FolderStoreConfig, RemoteStoreConfig};
use chasm_core::{ChasmError, ChasmResult, FileShare, StoreConfig, METADATA_FILE, IGNORE_FILE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ignore::IgnoreFilter;
use crate::paths::{absolutize, is_under, path_key};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChasmState {
    #[serde(skip)]
    root: PathBuf,
    /// Local mirror stores, in registration order
    #[serde(default)]
    pub folder_stores: Vec<FolderStoreConfig>,
    /// Remote object stores, in registration order
    #[serde(default)]
    pub remote_stores: Vec<RemoteStoreConfig>,
    /// Tracked file path → share record
    #[serde(default)]
    files: BTreeMap<String, FileShare>,
    /// Tracked directory paths
    #[serde(default)]
    dirs: BTreeSet<String>,
}

impl ChasmState {
    /// Open the state under `root`, creating the root, the state file and the
    /// default ignore rules on first use.
    pub fn init_or_load(root: &Path) -> ChasmResult<Self> {
        let root = &absolute_root(root)?;
        std::fs::create_dir_all(root).map_err(|source| ChasmError::WriteFailure {
            path: root.to_path_buf(),
            source,
        })?;

        let ignore = IgnoreFilter::for_root(root);
        if ignore.write_defaults()? {
            info!(path = %ignore.rules_path().display(), "wrote default ignore rules");
        }

        let state_path = root.join(METADATA_FILE);
        if state_path.exists() {
            return Self::load(root);
        }

        let mut state = Self {
            root: root.to_path_buf(),
            ..Default::default()
        };
        state.ensure_metadata_record();
        state.save()?;
        info!(root = %root.display(), "initialized chasm root");
        Ok(state)
    }

    /// Load an existing state file.
    pub fn load(root: &Path) -> ChasmResult<Self> {
        let root = &absolute_root(root)?;
        let path = root.join(METADATA_FILE);
        let bytes = std::fs::read(&path).map_err(|source| ChasmError::ReadFailure {
            path: path.clone(),
            source,
        })?;
        let mut state = Self::from_json(&bytes)?;
        state.root = root.to_path_buf();
        state.ensure_metadata_record();
        debug!(root = %root.display(), files = state.files.len(), dirs = state.dirs.len(), "loaded state");
        Ok(state)
    }

    /// Parse a serialized state. The result has no root attached.
    pub fn from_json(bytes: &[u8]) -> ChasmResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ChasmError::Manifest(format!("parsing state: {e}")))
    }

    pub fn to_json(&self) -> ChasmResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ChasmError::Manifest(format!("serializing state: {e}")))
    }

    /// Write the state file atomically and return the bytes written.
    pub fn save(&self) -> ChasmResult<Vec<u8>> {
        let json = self.to_json()?;
        let path = self.metadata_path();

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &json).map_err(|source| ChasmError::WriteFailure {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| ChasmError::WriteFailure {
            path: path.clone(),
            source,
        })?;
        Ok(json)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/.chasm`
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// `<root>/.chasmignore`
    pub fn ignore_path(&self) -> PathBuf {
        self.root.join(IGNORE_FILE)
    }

    fn ensure_metadata_record(&mut self) {
        let key = path_key(&self.metadata_path());
        self.files.entry(key).or_insert_with(FileShare::metadata);
    }

    // ── Stores ───────────────────────────────────────────────────────────

    /// Every registered store in positional order: folder stores, then
    /// remote stores, each in registration order.
    pub fn store_configs(&self) -> Vec<StoreConfig> {
        self.folder_stores
            .iter()
            .cloned()
            .map(StoreConfig::Folder)
            .chain(self.remote_stores.iter().cloned().map(StoreConfig::Remote))
            .collect()
    }

    pub fn registered_services(&self) -> usize {
        self.folder_stores.len() + self.remote_stores.len()
    }

    /// Fewer than two stores means splitting protects nothing.
    pub fn needs_setup(&self) -> bool {
        self.registered_services() < 2
    }

    // ── Tracked entries ──────────────────────────────────────────────────

    pub fn file(&self, path: &Path) -> Option<&FileShare> {
        self.files.get(&path_key(path))
    }

    pub fn insert_file(&mut self, path: &Path, record: FileShare) {
        self.files.insert(path_key(path), record);
    }

    pub fn remove_file(&mut self, path: &Path) -> Option<FileShare> {
        self.files.remove(&path_key(path))
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(&path_key(path))
    }

    pub fn insert_dir(&mut self, path: &Path) {
        self.dirs.insert(path_key(path));
    }

    pub fn remove_dir(&mut self, path: &Path) -> bool {
        self.dirs.remove(&path_key(path))
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &FileShare)> {
        self.files.iter().map(|(k, v)| (Path::new(k.as_str()), v))
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(|k| Path::new(k.as_str()))
    }

    /// Tracked files anywhere beneath `dir`, excluding the metadata record.
    pub fn files_under(&self, dir: &Path) -> Vec<(PathBuf, FileShare)> {
        self.files()
            .filter(|(p, rec)| !rec.is_metadata() && is_under(p, dir))
            .map(|(p, rec)| (p.to_path_buf(), rec.clone()))
            .collect()
    }

    /// `dir` itself (when tracked) and every tracked directory beneath it,
    /// deepest first.
    pub fn dirs_within(&self, dir: &Path) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .dirs()
            .filter(|p| *p == dir || is_under(p, dir))
            .map(Path::to_path_buf)
            .collect();
        out.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        out
    }

    /// Number of tracked user files (the metadata record is not counted).
    pub fn tracked_files(&self) -> usize {
        self.files.values().filter(|r| !r.is_metadata()).count()
    }
}

fn absolute_root(root: &Path) -> ChasmResult<PathBuf> {
    absolutize(root).map_err(|source| ChasmError::NotAccessible {
        path: root.to_path_buf(),
        source,
    })
}
