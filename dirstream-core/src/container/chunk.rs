//! Chunk framing for regular file content.
//!
//! Layout: `[magic:u32][length:u64][crc:u32][payload]`, big-endian, where the
//! CRC-32 covers the 12 bytes before it followed by the payload.

use crate::container::header::HEADER_MAGIC;
use crate::container::manifest::MANIFEST_MAGIC;
use crate::error::{FormatReason, Result, StreamError, Structure};
use crate::read::recover::scan_for_magic;
use crate::read::stream::StreamReader;
use std::io::{self, Read, Write};

pub const CHUNK_MAGIC: u32 = 0x9ABC_DEFF;
pub const CHUNK_HEADER_LEN: usize = 16;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
/// Upper bound on any chunk size, configured or accepted.
pub const MAX_CHUNK_SIZE: usize = 64 << 20;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    pub chunks: u64,
    pub bytes: u64,
    pub resyncs: u64,
}

fn chunk_crc(prefix: &[u8], payload: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(prefix);
    h.update(payload);
    h.finalize()
}

/// Read until `buf` is full or the source is exhausted.
fn fill<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Frame everything `src` yields into chunks of at most `chunk_size` bytes.
pub fn write_chunks<R: Read + ?Sized, W: Write + ?Sized>(
    w: &mut W,
    src: &mut R,
    chunk_size: usize,
) -> Result<ChunkStats> {
    let mut buf = vec![0u8; chunk_size.clamp(1, MAX_CHUNK_SIZE)];
    let mut stats = ChunkStats::default();
    loop {
        let n = fill(src, &mut buf)?;
        if n == 0 {
            break;
        }
        let mut head = [0u8; CHUNK_HEADER_LEN];
        head[0..4].copy_from_slice(&CHUNK_MAGIC.to_be_bytes());
        head[4..12].copy_from_slice(&(n as u64).to_be_bytes());
        let crc = chunk_crc(&head[..12], &buf[..n]);
        head[12..16].copy_from_slice(&crc.to_be_bytes());
        w.write_all(&head)?;
        w.write_all(&buf[..n])?;
        stats.chunks += 1;
        stats.bytes += n as u64;
    }
    Ok(stats)
}

/// Read chunks until `expected` payload bytes have been copied into `dst`.
///
/// The declared length is checked against `max_chunk` before any buffer is
/// sized from it. Every other check on the length runs after the checksum, so
/// a damaged length field reads as an integrity failure. With
/// `strict == false` a bad chunk magic triggers a bounded scan for the next
/// chunk; checksum mismatches are always fatal.
pub fn read_chunks<R: Read, W: Write + ?Sized>(
    r: &mut StreamReader<R>,
    dst: &mut W,
    expected: u64,
    max_chunk: usize,
    strict: bool,
) -> Result<ChunkStats> {
    let mut stats = ChunkStats::default();
    let mut buf = Vec::new();
    let max_chunk = max_chunk.min(MAX_CHUNK_SIZE);
    let budget = max_chunk.saturating_add(CHUNK_HEADER_LEN) as u64;

    while stats.bytes < expected {
        let offset = r.position();
        let mut head = [0u8; CHUNK_HEADER_LEN];
        r.read_record(&mut head, offset, "chunk header")?;

        let magic = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        if magic != CHUNK_MAGIC {
            if !strict {
                r.unread(&head[1..]);
                let hit = scan_for_magic(r, &[CHUNK_MAGIC, HEADER_MAGIC, MANIFEST_MAGIC], budget)?;
                if let Some(hit) = hit.filter(|h| h.magic == CHUNK_MAGIC) {
                    tracing::warn!(
                        offset,
                        skipped = hit.skipped + 1,
                        "resynchronized on next chunk"
                    );
                    stats.resyncs += 1;
                    continue;
                }
            }
            return Err(StreamError::format(
                offset,
                FormatReason::BadMagic {
                    what: Structure::Chunk,
                    expected: CHUNK_MAGIC,
                    found: magic,
                },
            ));
        }

        let mut len8 = [0u8; 8];
        len8.copy_from_slice(&head[4..12]);
        let len = u64::from_be_bytes(len8);
        if len > max_chunk as u64 {
            return Err(StreamError::format(
                offset,
                FormatReason::OversizedChunk {
                    len,
                    max: max_chunk as u64,
                },
            ));
        }

        let stored = u32::from_be_bytes([head[12], head[13], head[14], head[15]]);
        buf.resize(len as usize, 0);
        r.read_record(&mut buf, offset, "chunk payload")?;
        let computed = chunk_crc(&head[..12], &buf);
        if computed != stored {
            return Err(StreamError::Integrity {
                what: Structure::Chunk,
                offset,
                expected: stored,
                actual: computed,
            });
        }

        let remaining = expected - stats.bytes;
        if len > remaining {
            return Err(StreamError::format(
                offset,
                FormatReason::ChunkOverrun { len, remaining },
            ));
        }
        if len == 0 {
            return Err(StreamError::format(offset, FormatReason::EmptyChunk));
        }

        dst.write_all(&buf)?;
        stats.chunks += 1;
        stats.bytes += len;
    }
    Ok(stats)
}
