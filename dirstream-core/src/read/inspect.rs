use super::stream::StreamReader;
use super::walk::{Body, EntryVisitor, walk_stream};
use crate::container::entry::{Entry, EntryType};
use crate::container::manifest::Manifest;
use crate::error::Result;
use crate::options::DecodeOptions;
use serde::Serialize;
use std::io::{self, BufReader, Read};
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InspectedEntry {
    pub path: String,
    pub kind: EntryType,
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub link_target: Option<String>,
    pub header_offset: u64,
    pub chunks: u64,
}

impl InspectedEntry {
    /// `YYYY-MM-DD hh:mm:ss` in UTC, or the raw seconds if out of range.
    pub fn modified_utc(&self) -> String {
        let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        OffsetDateTime::from_unix_timestamp(self.mtime)
            .ok()
            .and_then(|t| t.format(&fmt).ok())
            .unwrap_or_else(|| self.mtime.to_string())
    }
}

/// Everything a stream holds, without its content.
#[derive(Serialize, Debug, Default, Clone)]
pub struct StreamIndex {
    pub entries: Vec<InspectedEntry>,
    pub manifest: Option<Manifest>,
    /// Sum of regular file sizes.
    pub total_bytes: u64,
    pub resyncs: u64,
    pub stream_len: u64,
}

#[derive(Default)]
struct Collector {
    entries: Vec<InspectedEntry>,
}

impl EntryVisitor for Collector {
    fn visit<R: Read>(&mut self, entry: &Entry, offset: u64, body: &mut Body<'_, R>) -> Result<()> {
        let stats = body.copy_to(&mut io::sink())?;
        self.entries.push(InspectedEntry {
            path: entry.path.clone(),
            kind: entry.kind,
            size: entry.size,
            mode: entry.mode,
            mtime: entry.mtime,
            link_target: entry.link_target.clone(),
            header_offset: offset,
            chunks: stats.chunks,
        });
        Ok(())
    }
}

/// Read and verify a whole stream without touching the filesystem.
///
/// Every checksum is checked exactly as during decoding, so a successful
/// inspection means a decode of the same bytes would not fail on the stream
/// itself.
pub fn inspect<R: Read>(input: R, opts: &DecodeOptions) -> Result<StreamIndex> {
    let mut reader = StreamReader::new(BufReader::new(input));
    let mut collector = Collector::default();
    let outcome = walk_stream(&mut reader, opts, &mut collector)?;
    Ok(StreamIndex {
        total_bytes: outcome.bytes,
        entries: collector.entries,
        manifest: outcome.manifest,
        resyncs: outcome.resyncs,
        stream_len: outcome.stream_len,
    })
}
