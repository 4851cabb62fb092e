use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration (loaded from chasm.toml)
///
/// Store registrations are not part of this file; they live in the root's
/// `.chasm` state so a restore recovers them along with the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChasmConfig {
    /// The chasm root directory (holds .chasm and .chasmignore)
    pub root: PathBuf,
    pub log: LogConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent directory for per-store staging areas during restore
    /// (default: system temp dir)
    pub staging_dir: Option<PathBuf>,
    /// Refuse plaintext HTTP endpoints for remote stores
    pub enforce_tls: bool,
}

impl Default for ChasmConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("~/chasm"),
            log: LogConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl StorageConfig {
    /// Resolve the staging parent directory.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| std::env::temp_dir().join("chasm-staging"))
    }
}

impl ChasmConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }

    /// The root with `~` expanded.
    pub fn root_dir(&self) -> PathBuf {
        expand_tilde(&self.root)
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else if s == "~" {
        PathBuf::from(std::env::var("HOME").unwrap_or_default())
    } else {
        path.to_path_buf()
    }
}
