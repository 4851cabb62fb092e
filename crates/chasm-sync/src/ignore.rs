//! `.chasmignore` filter
//!
//! One glob pattern per line, matched against a path's base name only. The
//! rules file is re-read on every decision so edits apply immediately. When
//! the file is absent every path is tracked.

use anyhow::{Context, Result};
use chasm_core::IGNORE_FILE;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Rules written when a root is initialized.
pub const DEFAULT_RULES: &[&str] = &[".DS_Store", "Thumbs.db"];

#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    rules_path: PathBuf,
}

impl IgnoreFilter {
    /// Filter backed by `<root>/.chasmignore`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            rules_path: root.join(IGNORE_FILE),
        }
    }

    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }

    /// Whether `path` should be tracked.
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.matching_rule(path).is_none()
    }

    /// The first pattern excluding `path`, if any.
    pub fn matching_rule(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy();
        let content = match std::fs::read_to_string(&self.rules_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.rules_path.display(), "cannot read ignore rules: {e}");
                return None;
            }
        };

        for line in content.lines() {
            let rule = line.trim_end_matches('\r');
            if rule.is_empty() {
                continue;
            }
            match glob::Pattern::new(rule) {
                Ok(pattern) if pattern.matches(&name) => return Some(rule.to_string()),
                Ok(_) => {}
                Err(e) => warn!(pattern = %rule, "malformed ignore pattern: {e}"),
            }
        }
        None
    }

    /// Write the default rules unless a rules file already exists.
    pub fn write_defaults(&self) -> Result<bool> {
        if self.rules_path.exists() {
            return Ok(false);
        }
        let mut content = DEFAULT_RULES.join("\n");
        content.push('\n');
        std::fs::write(&self.rules_path, content)
            .with_context(|| format!("writing ignore rules: {}", self.rules_path.display()))?;
        Ok(true)
    }
}
