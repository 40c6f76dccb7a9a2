use crate::container::chunk::{CHUNK_HEADER_LEN, write_chunks};
use crate::container::entry::Entry;
use crate::container::header::write_header;
use crate::container::manifest::{Manifest, ManifestEntry};
use crate::error::{FormatReason, Result, StreamError};
use crate::options::EncodeOptions;
use crate::pack::pipe::{CancelToken, EncodedStream};
use crate::util::counting::CountingWriter;
use crate::util::fsmeta::{mode_from, mtime_from};
use crate::util::sanitize::normalize_relative;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Totals for one encode run.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub directories: u64,
    pub regular_files: u64,
    pub symlinks: u64,
    pub chunks: u64,
    /// Content bytes, excluding framing.
    pub bytes: u64,
    /// Total stream length, manifest included.
    pub stream_len: u64,
    /// Paths left out because they are neither file, directory nor symlink.
    pub skipped: Vec<String>,
}

/// Checks the cancel token before every read of file content.
struct CancelRead<'a, R> {
    inner: R,
    cancel: &'a CancelToken,
}

impl<R: Read> Read for CancelRead<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cancel.check()?;
        self.inner.read(buf)
    }
}

/// Normalize every path and refuse lists that name one path twice.
fn normalize_paths<S: AsRef<str>>(paths: &[S]) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(paths.len());
    let mut out = Vec::with_capacity(paths.len());
    for raw in paths {
        let rel = normalize_relative(raw.as_ref())?;
        if !seen.insert(rel.clone()) {
            return Err(StreamError::Unencodable(FormatReason::DuplicatePath(rel)));
        }
        out.push(rel);
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct Encoder {
    root: PathBuf,
    opts: EncodeOptions,
}

impl Encoder {
    /// The root must be an existing directory and not itself a symlink.
    pub fn new(root: impl Into<PathBuf>, opts: EncodeOptions) -> Result<Self> {
        let root = root.into();
        let md = fs::symlink_metadata(&root).map_err(|e| StreamError::Setup {
            path: root.clone(),
            reason: e.to_string(),
        })?;
        if md.file_type().is_symlink() {
            return Err(StreamError::Setup {
                path: root,
                reason: "root is a symlink".into(),
            });
        }
        if !md.is_dir() {
            return Err(StreamError::Setup {
                path: root,
                reason: "root is not a directory".into(),
            });
        }
        Ok(Self { root, opts })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode `paths` on a background thread and return the stream as it is
    /// produced. Path validation happens up front; everything else surfaces
    /// through `Read`.
    pub fn encode<S: AsRef<str>>(&self, paths: &[S]) -> Result<EncodedStream> {
        let paths = normalize_paths(paths)?;
        let cancel = self.opts.cancel.child();
        let mut job = self.clone();
        job.opts.cancel = cancel.clone();
        EncodedStream::spawn(
            self.opts.channel_depth,
            cancel,
            self.opts.read_timeout,
            move |w| job.encode_to(&paths, w),
        )
    }

    /// Encode `paths` synchronously into `out`.
    pub fn encode_to<S: AsRef<str>, W: Write>(&self, paths: &[S], out: W) -> Result<EncodeSummary> {
        let paths = normalize_paths(paths)?;
        let chunk_size = self.opts.effective_chunk_size();
        let mut w = BufWriter::with_capacity(chunk_size + CHUNK_HEADER_LEN, CountingWriter::new(out));
        let mut manifest = Manifest::default();
        let mut summary = EncodeSummary::default();

        for rel in &paths {
            self.opts.cancel.check()?;
            // Offsets count bytes that actually left the buffer.
            w.flush()?;
            let offset = w.get_ref().count();
            let entry = self
                .encode_entry(rel, &mut w, chunk_size, &mut summary)
                .map_err(|e| e.in_entry(rel))?;
            if let Some(entry) = entry {
                manifest.push(ManifestEntry::for_entry(&entry, offset));
            }
        }

        self.opts.cancel.check()?;
        manifest.write_to(&mut w)?;
        w.flush()?;
        summary.stream_len = w.get_ref().count();
        info!(
            root = %self.root.display(),
            entries = manifest.len(),
            chunks = summary.chunks,
            bytes = summary.bytes,
            skipped = summary.skipped.len(),
            "encode finished"
        );
        Ok(summary)
    }

    fn encode_entry<W: Write>(
        &self,
        rel: &str,
        w: &mut W,
        chunk_size: usize,
        summary: &mut EncodeSummary,
    ) -> Result<Option<Entry>> {
        let full = self.root.join(rel);
        let md = fs::symlink_metadata(&full)?;
        let ft = md.file_type();
        let mtime = mtime_from(&md);

        let entry = if ft.is_symlink() {
            let target = fs::read_link(&full)?;
            let target = target
                .to_str()
                .ok_or(StreamError::Unencodable(FormatReason::InvalidUtf8("link target")))?;
            let entry = Entry::symlink(rel, target, mtime);
            write_header(w, &entry)?;
            summary.symlinks += 1;
            entry
        } else if ft.is_dir() {
            let entry = Entry::directory(rel, mode_from(&md), mtime);
            write_header(w, &entry)?;
            summary.directories += 1;
            entry
        } else if ft.is_file() {
            let entry = Entry::regular(rel, md.len(), mode_from(&md), mtime);
            let file = File::open(&full)?;
            write_header(w, &entry)?;
            let mut src = CancelRead {
                inner: file.take(entry.size),
                cancel: &self.opts.cancel,
            };
            let stats = write_chunks(w, &mut src, chunk_size)?;
            if stats.bytes != entry.size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "file shrank while encoding: header says {} bytes, read {}",
                        entry.size, stats.bytes
                    ),
                )
                .into());
            }
            summary.regular_files += 1;
            summary.chunks += stats.chunks;
            summary.bytes += stats.bytes;
            entry
        } else {
            warn!(path = rel, "skipping unsupported file type");
            summary.skipped.push(rel.to_string());
            return Ok(None);
        };

        debug!(path = rel, kind = entry.kind.as_str(), size = entry.size, "encoded entry");
        Ok(Some(entry))
    }
}
