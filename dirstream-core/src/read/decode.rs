use super::stream::StreamReader;
use super::walk::{Body, EntryVisitor, walk_stream};
use crate::container::entry::{Entry, EntryType};
use crate::container::manifest::Manifest;
use crate::error::{FormatReason, Result, StreamError};
use crate::options::DecodeOptions;
use crate::util::fsmeta::{create_file, create_symlink, set_file_mtime, set_mode};
use crate::util::sanitize::{absolute_root, ensure_no_symlink_ancestors, resolve};
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Serialize, Debug, Default, Clone)]
pub struct DecodeReport {
    pub directories: u64,
    pub regular_files: u64,
    pub symlinks: u64,
    /// Content bytes written to regular files.
    pub bytes: u64,
    pub chunks: u64,
    /// Times the reader had to skip damaged bytes (non-strict only).
    pub resyncs: u64,
    pub manifest: Option<Manifest>,
}

/// Rebuilds a directory tree from a stream.
///
/// Entries are applied as they arrive and are not rolled back when a later
/// record fails.
pub struct Decoder {
    dest: PathBuf,
    opts: DecodeOptions,
}

impl Decoder {
    pub fn new(dest: impl Into<PathBuf>, opts: DecodeOptions) -> Self {
        Self {
            dest: dest.into(),
            opts,
        }
    }

    pub fn decode<R: Read>(&self, input: R) -> Result<DecodeReport> {
        fs::create_dir_all(&self.dest)?;
        let root = absolute_root(&self.dest)?;
        let mut reader = StreamReader::new(BufReader::new(input));
        let mut extractor = Extractor {
            root: &root,
            report: DecodeReport::default(),
            dir_modes: Vec::new(),
        };
        let outcome = walk_stream(&mut reader, &self.opts, &mut extractor)?;

        // Children first, so a read-only parent does not block its subtree.
        for (dir, mode) in extractor.dir_modes.iter().rev() {
            // set_permissions follows links; never chmod outside the root
            if fs::symlink_metadata(dir)?.file_type().is_symlink() {
                return Err(StreamError::path_safety(
                    dir.display().to_string(),
                    "directory was replaced by a symlink",
                ));
            }
            set_mode(dir, *mode)?;
        }

        let mut report = extractor.report;
        report.chunks = outcome.chunks;
        report.resyncs = outcome.resyncs;
        report.manifest = outcome.manifest;
        info!(
            dest = %root.display(),
            dirs = report.directories,
            files = report.regular_files,
            symlinks = report.symlinks,
            bytes = report.bytes,
            resyncs = report.resyncs,
            "decode finished"
        );
        Ok(report)
    }
}

struct Extractor<'a> {
    root: &'a Path,
    report: DecodeReport,
    dir_modes: Vec<(PathBuf, u32)>,
}

/// Remove a symlink sitting where an entry is about to be created.
fn clear_symlink(target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok_and(|md| md.file_type().is_symlink()) {
        debug!(path = %target.display(), "removing symlink in the way");
        fs::remove_file(target)?;
    }
    Ok(())
}

impl Extractor<'_> {
    fn place_symlink(&mut self, entry: &Entry, offset: u64, target: &Path) -> Result<()> {
        let link_target = entry
            .link_target
            .as_deref()
            .ok_or(StreamError::format(offset, FormatReason::MissingLinkTarget))?;
        match fs::symlink_metadata(target) {
            Ok(md) if md.file_type().is_symlink() => fs::remove_file(target)?,
            Ok(_) => return Err(StreamError::Conflict(target.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        create_symlink(link_target, target)?;
        self.report.symlinks += 1;
        Ok(())
    }
}

impl EntryVisitor for Extractor<'_> {
    fn visit<R: Read>(
        &mut self,
        entry: &Entry,
        offset: u64,
        body: &mut Body<'_, R>,
    ) -> Result<()> {
        let target = resolve(self.root, &entry.path)?;
        ensure_no_symlink_ancestors(self.root, &target, &entry.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match entry.kind {
            EntryType::Directory => {
                // create_dir_all accepts a link to a directory
                clear_symlink(&target)?;
                fs::create_dir_all(&target)?;
                self.dir_modes.push((target, entry.mode));
                self.report.directories += 1;
            }
            EntryType::Symlink => self.place_symlink(entry, offset, &target)?,
            EntryType::Regular => {
                // Never write through a link left at the destination.
                clear_symlink(&target)?;
                let mut file = create_file(&target, entry.mode)?;
                let stats = body.copy_to(&mut file)?;
                if let Err(e) = set_file_mtime(&file, entry.mtime) {
                    debug!(path = %entry.path, error = %e, "could not restore mtime");
                }
                self.report.regular_files += 1;
                self.report.bytes += stats.bytes;
            }
        }
        debug!(path = %entry.path, kind = entry.kind.as_str(), "decoded entry");
        Ok(())
    }
}
