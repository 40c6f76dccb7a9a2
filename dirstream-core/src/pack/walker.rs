use crate::error::{FormatReason, Result, StreamError};
use std::io;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

fn is_excluded(entry: &DirEntry, excludes: &[String]) -> bool {
    let name = entry.file_name().to_string_lossy();
    excludes.iter().any(|x| *x == name)
}

fn rel_string(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for comp in rel.components() {
        if let Component::Normal(part) = comp {
            let part = part
                .to_str()
                .ok_or(StreamError::Unencodable(FormatReason::InvalidUtf8("path")))?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

/// Every path under `root`, relative and `/`-separated, parents before
/// children, siblings sorted by name.
///
/// An entry whose base name equals one of `excludes` is skipped; an excluded
/// directory is not descended into. Symlinks are listed, never followed.
pub fn build_file_list(root: &Path, excludes: &[String]) -> Result<Vec<String>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_excluded(e, excludes));

    let mut out = Vec::new();
    for e in walker {
        let e = e.map_err(io::Error::from)?;
        let rel = e
            .path()
            .strip_prefix(root)
            .map_err(|_| StreamError::path_safety(e.path().display().to_string(), "outside walk root"))?;
        out.push(rel_string(rel)?);
    }
    Ok(out)
}
