use crate::container::entry::{Entry, EntryType};
use crate::error::{FormatReason, Result, StreamError, Structure};
use crate::read::stream::StreamReader;
use std::io::{Read, Write};

pub const HEADER_MAGIC: u32 = 0x4952_5353;
pub const HEADER_VERSION: u32 = 1;
/// magic + version + record length
pub const HEADER_PREFIX_LEN: usize = 10;
pub const MAX_PATH_LEN: usize = 4096;

fn push_str16(buf: &mut Vec<u8>, s: &str, field: &'static str) -> Result<()> {
    if s.len() > MAX_PATH_LEN {
        return Err(StreamError::Unencodable(FormatReason::FieldTooLong {
            field,
            len: s.len(),
            max: MAX_PATH_LEN,
        }));
    }
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Serialize `entry` into a complete header record, checksum included.
pub fn encode_header(entry: &Entry) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + entry.path.len());
    buf.extend_from_slice(&HEADER_MAGIC.to_be_bytes());
    buf.extend_from_slice(&HEADER_VERSION.to_be_bytes());
    // record length, patched below
    buf.extend_from_slice(&0u16.to_be_bytes());

    push_str16(&mut buf, &entry.path, "path")?;
    buf.extend_from_slice(&entry.size.to_be_bytes());
    buf.extend_from_slice(&entry.mode.to_be_bytes());
    buf.extend_from_slice(&entry.mtime.to_be_bytes());
    buf.push(entry.kind.tag());

    if entry.kind == EntryType::Symlink {
        let target = entry
            .link_target
            .as_deref()
            .ok_or(StreamError::Unencodable(FormatReason::MissingLinkTarget))?;
        push_str16(&mut buf, target, "link target")?;
    }

    // Two 4 KiB strings plus fixed fields always fit in u16.
    let record_len = buf.len() as u16;
    buf[8..10].copy_from_slice(&record_len.to_be_bytes());

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    Ok(buf)
}

pub fn write_header<W: Write + ?Sized>(w: &mut W, entry: &Entry) -> Result<u64> {
    let record = encode_header(entry)?;
    w.write_all(&record)?;
    Ok(record.len() as u64)
}

/// Read one header record starting at the reader's current position.
///
/// The checksum is verified over the whole record before any field is
/// trusted.
pub fn read_header<R: Read>(r: &mut StreamReader<R>) -> Result<Entry> {
    let offset = r.position();
    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    r.read_record(&mut prefix, offset, "header")?;

    let magic = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if magic != HEADER_MAGIC {
        return Err(StreamError::format(
            offset,
            FormatReason::BadMagic {
                what: Structure::Header,
                expected: HEADER_MAGIC,
                found: magic,
            },
        ));
    }
    let record_len = u16::from_be_bytes([prefix[8], prefix[9]]);
    if (record_len as usize) < HEADER_PREFIX_LEN {
        return Err(StreamError::format(
            offset,
            FormatReason::InvalidRecordLength(record_len),
        ));
    }

    let mut record = vec![0u8; record_len as usize];
    record[..HEADER_PREFIX_LEN].copy_from_slice(&prefix);
    r.read_record(&mut record[HEADER_PREFIX_LEN..], offset, "header")?;
    let mut crc = [0u8; 4];
    r.read_record(&mut crc, offset, "header checksum")?;

    let stored = u32::from_be_bytes(crc);
    let computed = crc32fast::hash(&record);
    if stored != computed {
        return Err(StreamError::Integrity {
            what: Structure::Header,
            offset,
            expected: stored,
            actual: computed,
        });
    }

    let version = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    if version != HEADER_VERSION {
        return Err(StreamError::format(
            offset,
            FormatReason::UnsupportedVersion {
                what: Structure::Header,
                version,
            },
        ));
    }

    parse_fields(&record[HEADER_PREFIX_LEN..], offset)
}

/// Bounds-checked reader over an already verified record.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> Fields<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(StreamError::format(
                self.offset,
                FormatReason::Truncated("header"),
            ));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn string16(&mut self, what: &'static str) -> Result<String> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StreamError::format(self.offset, FormatReason::InvalidUtf8(what)))
    }
}

fn parse_fields(buf: &[u8], offset: u64) -> Result<Entry> {
    let mut f = Fields {
        buf,
        pos: 0,
        offset,
    };
    let path = f.string16("path")?;
    let size = u64::from_be_bytes(f.array()?);
    let mode = u32::from_be_bytes(f.array()?);
    let mtime = i64::from_be_bytes(f.array()?);
    let [tag] = f.array::<1>()?;
    let kind = EntryType::from_tag(tag)
        .ok_or_else(|| StreamError::format(offset, FormatReason::UnknownEntryType(tag)))?;
    let link_target = match kind {
        EntryType::Symlink => Some(f.string16("link target")?),
        _ => None,
    };
    Ok(Entry {
        path,
        kind,
        size,
        mode,
        mtime,
        link_target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(bytes: &[u8]) -> Result<Entry> {
        read_header(&mut StreamReader::new(bytes))
    }

    #[test]
    fn regular_header_layout() {
        let e = Entry::regular("a/b.txt", 12, 0o100644, 1_700_000_000);
        let rec = encode_header(&e).unwrap();
        // prefix + pathlen + path + size + mode + mtime + type, then crc
        let body = HEADER_PREFIX_LEN + 2 + 7 + 8 + 4 + 8 + 1;
        assert_eq!(rec.len(), body + 4);
        assert_eq!(u16::from_be_bytes([rec[8], rec[9]]) as usize, body);
        assert_eq!(parse(&rec).unwrap(), e);
    }

    #[test]
    fn symlink_target_survives() {
        let e = Entry::symlink("bin/python", "../lib/python3.12", -5);
        let rec = encode_header(&e).unwrap();
        let back = parse(&rec).unwrap();
        assert_eq!(back.link_target.as_deref(), Some("../lib/python3.12"));
        assert_eq!(back.mtime, -5);
    }

    #[test]
    fn overlong_path_is_rejected_on_write() {
        let e = Entry::regular("x".repeat(MAX_PATH_LEN + 1), 0, 0o644, 0);
        let err = encode_header(&e).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn every_bit_flip_is_detected() {
        let rec = encode_header(&Entry::directory("some/dir", 0o40755, 99)).unwrap();
        for i in 0..rec.len() {
            for bit in 0..8 {
                let mut bad = rec.clone();
                bad[i] ^= 1 << bit;
                assert!(parse(&bad).is_err(), "flip at byte {i} bit {bit} went unnoticed");
            }
        }
    }

    #[test]
    fn field_flip_is_checksum_mismatch() {
        let mut rec = encode_header(&Entry::regular("f", 5, 0o644, 0)).unwrap();
        // first byte of the size field
        rec[HEADER_PREFIX_LEN + 2 + 1] ^= 0x80;
        let err = parse(&rec).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Integrity {
                what: Structure::Header,
                ..
            }
        ));
    }

    #[test]
    fn length_field_past_record_end_is_truncated() {
        // Hand-built record whose path length claims more than the record holds.
        let mut rec = Vec::new();
        rec.extend_from_slice(&HEADER_MAGIC.to_be_bytes());
        rec.extend_from_slice(&HEADER_VERSION.to_be_bytes());
        rec.extend_from_slice(&14u16.to_be_bytes());
        rec.extend_from_slice(&500u16.to_be_bytes());
        rec.extend_from_slice(b"ab");
        let crc = crc32fast::hash(&rec);
        rec.extend_from_slice(&crc.to_be_bytes());
        let err = parse(&rec).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Format {
                reason: FormatReason::Truncated("header"),
                ..
            }
        ));
    }

    #[test]
    fn unknown_type_tag_is_format_error() {
        let mut rec = encode_header(&Entry::regular("f", 0, 0o644, 0)).unwrap();
        let tag_at = rec.len() - 5;
        rec[tag_at] = 9;
        let body_len = rec.len() - 4;
        let crc = crc32fast::hash(&rec[..body_len]);
        rec[body_len..].copy_from_slice(&crc.to_be_bytes());
        let err = parse(&rec).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Format {
                reason: FormatReason::UnknownEntryType(9),
                ..
            }
        ));
    }
}
