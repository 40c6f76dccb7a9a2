//! The decode loop shared by extraction and inspection.

use super::recover::scan_for_magic;
use super::stream::{Peek, StreamReader};
use crate::container::chunk::{CHUNK_HEADER_LEN, ChunkStats, read_chunks};
use crate::container::entry::Entry;
use crate::container::header::{HEADER_MAGIC, read_header};
use crate::container::manifest::{MANIFEST_MAGIC, Manifest, ManifestEntry};
use crate::error::{FormatReason, Result, StreamError, Structure};
use crate::options::DecodeOptions;
use std::io::{self, Read, Write};
use tracing::{debug, warn};

/// Content of the entry being visited. Chunks not consumed by the visitor
/// are verified and discarded after it returns.
pub struct Body<'a, R> {
    reader: &'a mut StreamReader<R>,
    size: u64,
    max_chunk: usize,
    strict: bool,
    stats: Option<ChunkStats>,
}

impl<R: Read> Body<'_, R> {
    pub fn copy_to<W: Write + ?Sized>(&mut self, dst: &mut W) -> Result<ChunkStats> {
        if let Some(stats) = self.stats {
            return Ok(stats);
        }
        let stats = read_chunks(&mut *self.reader, dst, self.size, self.max_chunk, self.strict)?;
        self.stats = Some(stats);
        Ok(stats)
    }
}

pub trait EntryVisitor {
    /// Called once per entry, after its header has been verified.
    fn visit<R: Read>(
        &mut self,
        entry: &Entry,
        offset: u64,
        body: &mut Body<'_, R>,
    ) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// What the stream actually contained, in manifest form.
    pub observed: Manifest,
    /// The manifest the stream ended with, if it had one.
    pub manifest: Option<Manifest>,
    pub chunks: u64,
    pub bytes: u64,
    pub resyncs: u64,
    pub stream_len: u64,
}

fn not_a_header(offset: u64, peek: Peek) -> StreamError {
    match peek {
        Peek::Word(found) => StreamError::format(
            offset,
            FormatReason::BadMagic {
                what: Structure::Header,
                expected: HEADER_MAGIC,
                found,
            },
        ),
        _ => StreamError::format(offset, FormatReason::Truncated("header")),
    }
}

/// Drive `visitor` over every entry of the stream, then validate the
/// manifest against what was seen.
pub fn walk_stream<R: Read, V: EntryVisitor>(
    r: &mut StreamReader<R>,
    opts: &DecodeOptions,
    visitor: &mut V,
) -> Result<WalkOutcome> {
    let strict = opts.strict;
    let max_chunk = opts.effective_max_chunk();
    let budget = max_chunk.saturating_add(CHUNK_HEADER_LEN) as u64;
    let mut out = WalkOutcome::default();

    loop {
        let offset = r.position();
        let peek = r.peek_u32()?;
        match peek {
            Peek::Eof => {
                if opts.require_manifest {
                    return Err(StreamError::format(offset, FormatReason::MissingManifest));
                }
                if offset > 0 {
                    warn!(offset, "stream ends without a manifest");
                }
                break;
            }
            Peek::Word(MANIFEST_MAGIC) => {
                out.manifest = Some(Manifest::read_from(r, offset)?);
                reject_trailing(r, strict)?;
                break;
            }
            Peek::Word(HEADER_MAGIC) => {}
            other => {
                let err = not_a_header(offset, other);
                if strict {
                    return Err(err);
                }
                match scan_for_magic(r, &[HEADER_MAGIC, MANIFEST_MAGIC], budget)? {
                    Some(hit) => {
                        warn!(offset, skipped = hit.skipped, "resynchronized on next record");
                        out.resyncs += 1;
                        continue;
                    }
                    None => return Err(err),
                }
            }
        }

        let entry = read_header(r)?;
        let mut body = Body {
            reader: &mut *r,
            size: entry.size_on_wire(),
            max_chunk,
            strict,
            stats: None,
        };
        let stats = visitor
            .visit(&entry, offset, &mut body)
            .and_then(|()| body.copy_to(&mut io::sink()))
            .map_err(|e| e.in_entry(&entry.path))?;
        debug!(path = %entry.path, offset, chunks = stats.chunks, "entry done");

        out.chunks += stats.chunks;
        out.bytes += stats.bytes;
        out.resyncs += stats.resyncs;
        out.observed.push(ManifestEntry::for_entry(&entry, offset));
    }

    out.stream_len = r.position();
    cross_check(&out.observed, out.manifest.as_ref(), strict)?;
    Ok(out)
}

fn reject_trailing<R: Read>(r: &mut StreamReader<R>, strict: bool) -> Result<()> {
    let offset = r.position();
    if r.peek_u32()? == Peek::Eof {
        return Ok(());
    }
    if strict {
        return Err(StreamError::format(offset, FormatReason::TrailingData));
    }
    warn!(offset, "ignoring data after the manifest");
    Ok(())
}

fn cross_check(observed: &Manifest, declared: Option<&Manifest>, strict: bool) -> Result<()> {
    let Some(declared) = declared else {
        return Ok(());
    };
    let problem = if observed.len() != declared.len() {
        Some(format!(
            "manifest lists {} entries, stream holds {}",
            declared.len(),
            observed.len()
        ))
    } else {
        observed
            .entries
            .iter()
            .zip(&declared.entries)
            .find(|(seen, listed)| seen != listed)
            .map(|(seen, listed)| {
                format!(
                    "{:?} ({}, {} bytes) at offset {} is listed as {:?} ({}, {} bytes) at offset {}",
                    seen.path,
                    seen.kind.as_str(),
                    seen.size,
                    seen.header_offset,
                    listed.path,
                    listed.kind.as_str(),
                    listed.size,
                    listed.header_offset
                )
            })
    };
    match problem {
        None => Ok(()),
        Some(msg) if strict => Err(StreamError::ManifestMismatch(msg)),
        Some(msg) => {
            warn!("manifest disagrees with stream: {msg}");
            Ok(())
        }
    }
}
