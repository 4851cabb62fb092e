//! Path normalization for state keys
//!
//! Keys are absolute and lexically cleaned (`.` dropped, `..` folded). Symlinks
//! are not resolved, so a path is tracked under the name the caller used.

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against the current directory, then clean it.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    Ok(clean(&std::path::absolute(path)?))
}

/// Lexically normalize a path without touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // ".." at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// State map key for a normalized path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Whether `path` lies strictly beneath `dir` (component-wise).
pub fn is_under(path: &Path, dir: &Path) -> bool {
    path != dir && path.starts_with(dir)
}
