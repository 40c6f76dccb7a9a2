use crate::container::entry::{Entry, EntryType};
use crate::container::header::MAX_PATH_LEN;
use crate::error::{FormatReason, Result, StreamError, Structure};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const MANIFEST_MAGIC: u32 = 0x4D41_4E49; // "MANI"
pub const MANIFEST_VERSION: u32 = 1;
/// magic + version + entry count
const PREFIX_LEN: usize = 16;
/// header offset + size + type + path length
const ENTRY_FIXED_LEN: usize = 19;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Stream offset of the entry's header record.
    pub header_offset: u64,
    pub size: u64,
    pub kind: EntryType,
    pub path: String,
}

impl ManifestEntry {
    pub fn for_entry(entry: &Entry, header_offset: u64) -> Self {
        Self {
            header_offset,
            size: entry.size,
            kind: entry.kind,
            path: entry.path.clone(),
        }
    }
}

/// Trailing index of every entry in a stream, in encode order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body: usize = self
            .entries
            .iter()
            .map(|e| ENTRY_FIXED_LEN + e.path.len())
            .sum();
        let mut buf = Vec::with_capacity(PREFIX_LEN + body + 8);
        buf.extend_from_slice(&MANIFEST_MAGIC.to_be_bytes());
        buf.extend_from_slice(&MANIFEST_VERSION.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as u64).to_be_bytes());
        for e in &self.entries {
            if e.path.len() > MAX_PATH_LEN {
                return Err(StreamError::Unencodable(FormatReason::FieldTooLong {
                    field: "path",
                    len: e.path.len(),
                    max: MAX_PATH_LEN,
                }));
            }
            buf.extend_from_slice(&e.header_offset.to_be_bytes());
            buf.extend_from_slice(&e.size.to_be_bytes());
            buf.push(e.kind.tag());
            buf.extend_from_slice(&(e.path.len() as u16).to_be_bytes());
            buf.extend_from_slice(e.path.as_bytes());
        }
        buf.extend_from_slice(&MANIFEST_MAGIC.to_be_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(buf)
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<u64> {
        let bytes = self.to_bytes()?;
        w.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Parse a manifest whose magic starts at stream offset `offset`.
    ///
    /// Only the magic and the framing fields are used before the checksum
    /// has been verified; version, type tags and paths are checked after.
    pub fn read_from<R: Read>(r: &mut R, offset: u64) -> Result<Self> {
        let mut rd = ManifestReader {
            inner: r,
            crc: crc32fast::Hasher::new(),
            offset,
        };

        let prefix: [u8; PREFIX_LEN] = rd.array("manifest")?;
        let magic = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if magic != MANIFEST_MAGIC {
            return Err(StreamError::format(
                offset,
                FormatReason::BadMagic {
                    what: Structure::Manifest,
                    expected: MANIFEST_MAGIC,
                    found: magic,
                },
            ));
        }
        let mut count8 = [0u8; 8];
        count8.copy_from_slice(&prefix[8..16]);
        let count = u64::from_be_bytes(count8);

        // The count is untrusted until the checksum matches.
        let mut raw = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let fixed: [u8; ENTRY_FIXED_LEN] = rd.array("manifest entry")?;
            let path_len = u16::from_be_bytes([fixed[17], fixed[18]]) as usize;
            let mut path = vec![0u8; path_len];
            rd.fill(&mut path, "manifest path")?;
            raw.push((fixed, path));
        }

        let trailer: [u8; 4] = rd.array("manifest trailer")?;
        let trailer = u32::from_be_bytes(trailer);
        if trailer != MANIFEST_MAGIC {
            return Err(StreamError::format(
                offset,
                FormatReason::BadMagic {
                    what: Structure::Manifest,
                    expected: MANIFEST_MAGIC,
                    found: trailer,
                },
            ));
        }

        let ManifestReader { inner, crc, .. } = rd;
        let computed = crc.finalize();
        let mut stored = [0u8; 4];
        read_or_truncated(&mut *inner, &mut stored, offset, "manifest checksum")?;
        let stored = u32::from_be_bytes(stored);
        if stored != computed {
            return Err(StreamError::Integrity {
                what: Structure::Manifest,
                offset,
                expected: stored,
                actual: computed,
            });
        }

        let version = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if version != MANIFEST_VERSION {
            return Err(StreamError::format(
                offset,
                FormatReason::UnsupportedVersion {
                    what: Structure::Manifest,
                    version,
                },
            ));
        }

        let entries = raw
            .into_iter()
            .map(|(fixed, path)| -> Result<ManifestEntry> {
                let mut off8 = [0u8; 8];
                off8.copy_from_slice(&fixed[0..8]);
                let mut size8 = [0u8; 8];
                size8.copy_from_slice(&fixed[8..16]);
                let tag = fixed[16];
                let kind = EntryType::from_tag(tag).ok_or_else(|| {
                    StreamError::format(offset, FormatReason::UnknownEntryType(tag))
                })?;
                let path = String::from_utf8(path)
                    .map_err(|_| StreamError::format(offset, FormatReason::InvalidUtf8("path")))?;
                Ok(ManifestEntry {
                    header_offset: u64::from_be_bytes(off8),
                    size: u64::from_be_bytes(size8),
                    kind,
                    path,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

fn read_or_truncated<R: Read + ?Sized>(
    r: &mut R,
    buf: &mut [u8],
    offset: u64,
    what: &'static str,
) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            StreamError::format(offset, FormatReason::Truncated(what))
        } else {
            e.into()
        }
    })
}

/// Feeds every byte it reads into the running manifest checksum.
struct ManifestReader<'a, R> {
    inner: &'a mut R,
    crc: crc32fast::Hasher,
    offset: u64,
}

impl<R: Read> ManifestReader<'_, R> {
    fn fill(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        read_or_truncated(&mut *self.inner, buf, self.offset, what)?;
        self.crc.update(buf);
        Ok(())
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.fill(&mut out, what)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> Manifest {
        let mut m = Manifest::default();
        m.push(ManifestEntry {
            header_offset: 0,
            size: 0,
            kind: EntryType::Directory,
            path: "lib".into(),
        });
        m.push(ManifestEntry {
            header_offset: 41,
            size: 10,
            kind: EntryType::Regular,
            path: "lib/a.py".into(),
        });
        m
    }

    #[test]
    fn empty_manifest_is_24_bytes() {
        let bytes = Manifest::default().to_bytes().unwrap();
        assert_eq!(bytes.len(), PREFIX_LEN + 8);
        let back = Manifest::read_from(&mut &bytes[..], 0).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn parses_what_it_writes() {
        let m = sample();
        let bytes = m.to_bytes().unwrap();
        assert_eq!(Manifest::read_from(&mut &bytes[..], 0).unwrap(), m);
    }

    #[test]
    fn any_body_flip_fails() {
        let bytes = sample().to_bytes().unwrap();
        for i in 0..bytes.len() {
            let mut bad = bytes.clone();
            bad[i] ^= 0x10;
            let err = Manifest::read_from(&mut &bad[..], 0).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::Integrity | ErrorKind::Format),
                "byte {i}: {err}"
            );
        }
    }

    #[test]
    fn tag_and_version_flips_are_checksum_failures() {
        let bytes = sample().to_bytes().unwrap();
        // version, then the second entry's type tag
        let tag_at = PREFIX_LEN + ENTRY_FIXED_LEN + "lib".len() + 16;
        for at in [7, tag_at] {
            let mut bad = bytes.clone();
            bad[at] ^= 0x04;
            let err = Manifest::read_from(&mut &bad[..], 0).unwrap_err();
            assert!(
                matches!(
                    err,
                    StreamError::Integrity {
                        what: Structure::Manifest,
                        ..
                    }
                ),
                "byte {at}: {err}"
            );
        }
    }

    #[test]
    fn unknown_tag_under_a_valid_checksum_is_format_error() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[PREFIX_LEN + 16] = 7;
        let body_len = bytes.len() - 4;
        let crc = crc32fast::hash(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&crc.to_be_bytes());
        let err = Manifest::read_from(&mut &bytes[..], 0).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Format {
                reason: FormatReason::UnknownEntryType(7),
                ..
            }
        ));
    }

    #[test]
    fn missing_last_byte_is_truncation() {
        let bytes = sample().to_bytes().unwrap();
        let err = Manifest::read_from(&mut &bytes[..bytes.len() - 1], 0).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Format {
                reason: FormatReason::Truncated("manifest checksum"),
                ..
            }
        ));
    }
}
