//! Confinement of entry paths to a destination root.
//!
//! All checks here are lexical except [`ensure_no_symlink_ancestors`], which
//! looks at what earlier entries already placed on disk.

use crate::error::{Result, StreamError};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// A `..` directly under the root is dropped; a leading `..` on a relative
/// path is kept so callers can still see it.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, lexically clean form of `root`. The root need not exist.
pub fn absolute_root(root: &Path) -> Result<PathBuf> {
    Ok(clean(&std::path::absolute(root)?))
}

/// Map a stream path onto the filesystem under `root`.
///
/// Rejects empty paths, NUL bytes, absolute or drive-qualified paths, and
/// anything that ends up outside `root` after cleaning.
pub fn resolve(root: &Path, rel: &str) -> Result<PathBuf> {
    if rel.is_empty() {
        return Err(StreamError::path_safety(rel, "empty path"));
    }
    if rel.contains('\0') {
        return Err(StreamError::path_safety(rel, "path contains a NUL byte"));
    }
    let rel_path = Path::new(rel);
    let rooted = rel_path.has_root()
        || rel_path
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir));
    if rooted {
        return Err(StreamError::path_safety(rel, "absolute path"));
    }

    let root = absolute_root(root)?;
    let joined = clean(&root.join(rel_path));
    if !joined.starts_with(&root) {
        return Err(StreamError::path_safety(rel, "escapes the destination root"));
    }
    if joined.components().any(|c| c == Component::ParentDir) {
        return Err(StreamError::path_safety(rel, "parent directory reference"));
    }
    Ok(joined)
}

/// Refuse to write `target` if a directory between `root` and `target` is a
/// symlink. `root` must be the value returned by [`absolute_root`].
pub fn ensure_no_symlink_ancestors(root: &Path, target: &Path, rel: &str) -> Result<()> {
    let mut cur = target.parent();
    while let Some(dir) = cur {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        match fs::symlink_metadata(dir) {
            Ok(md) if md.file_type().is_symlink() => {
                return Err(StreamError::path_safety(
                    rel,
                    "parent directory is a symlink",
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        cur = dir.parent();
    }
    Ok(())
}

/// Normalize a caller-supplied path for the encoder: `/` separators, no
/// empty or `.` components, no `..`, not absolute.
pub fn normalize_relative(rel: &str) -> Result<String> {
    let unified = rel.replace('\\', "/");
    if unified.starts_with('/') || Path::new(rel).has_root() {
        return Err(StreamError::path_safety(rel, "absolute path"));
    }
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(StreamError::path_safety(rel, "parent directory reference")),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(StreamError::path_safety(rel, "empty path"));
    }
    Ok(parts.join("/"))
}
