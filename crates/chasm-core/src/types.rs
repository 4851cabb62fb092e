use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Name of the coordinator state file under the chasm root.
/// Also the reserved share id the state is split under.
pub const METADATA_FILE: &str = ".chasm";

/// Name of the ignore rules file under the chasm root.
pub const IGNORE_FILE: &str = ".chasmignore";

/// Opaque name used to locate one path's shares on every store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareId(String);

impl ShareId {
    /// Allocate a fresh, globally unique id (UUID v4, 32 hex chars).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The reserved id the coordinator state is shared under.
    pub fn metadata() -> Self {
        Self(METADATA_FILE.to_string())
    }

    /// The reserved id the ignore rules file is shared under.
    pub fn ignore_rules() -> Self {
        Self(IGNORE_FILE.to_string())
    }

    pub fn is_metadata(&self) -> bool {
        self.0 == METADATA_FILE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Share ids double as file names on stores and in staging areas.
    pub fn is_valid_file_name(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShareId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ShareId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Per-path record: where the shares live and what the content hashed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShare {
    #[serde(rename = "sid")]
    pub share_id: ShareId,
    /// URL-safe base64 SHA-256 of the content; empty for the metadata record
    pub hash: String,
}

impl FileShare {
    /// Record for the state file itself. The fingerprint is a sentinel because
    /// the content changes on every save.
    pub fn metadata() -> Self {
        Self {
            share_id: ShareId::metadata(),
            hash: String::new(),
        }
    }

    pub fn is_metadata(&self) -> bool {
        self.share_id.is_metadata()
    }
}

/// One piece of a split file, addressed by its path's share id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub share_id: ShareId,
    pub data: Vec<u8>,
}

/// A store that mirrors shares into a local directory
/// (a USB drive, a synced folder, a network mount).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStoreConfig {
    pub path: PathBuf,
}

/// Which OpenDAL service backs a remote store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteService {
    /// S3-compatible object storage
    #[default]
    S3,
    /// Process-local memory (tests and dry runs)
    Memory,
}

/// A store backed by a remote object service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    pub name: String,
    #[serde(default)]
    pub service: RemoteService,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    /// Key prefix the shares are written under
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "chasm".into()
}

/// A registered store in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Folder(FolderStoreConfig),
    Remote(RemoteStoreConfig),
}
