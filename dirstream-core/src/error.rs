use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// On-wire structure a check was performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    Chunk,
    Header,
    Manifest,
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Structure::Chunk => "chunk",
            Structure::Header => "header",
            Structure::Manifest => "manifest",
        })
    }
}

/// Why a stream is not well-formed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatReason {
    #[error("bad {what} magic: expected 0x{expected:08X}, found 0x{found:08X}")]
    BadMagic {
        what: Structure,
        expected: u32,
        found: u32,
    },

    #[error("unsupported {what} version {version}")]
    UnsupportedVersion { what: Structure, version: u32 },

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("invalid header record length {0}")]
    InvalidRecordLength(u16),

    #[error("oversized chunk: declared {len} bytes, maximum is {max}")]
    OversizedChunk { len: u64, max: u64 },

    #[error("chunk of {len} bytes overruns the {remaining} bytes left in the entry")]
    ChunkOverrun { len: u64, remaining: u64 },

    #[error("empty chunk inside a non-empty entry")]
    EmptyChunk,

    #[error("unknown entry type {0}")]
    UnknownEntryType(u8),

    #[error("symlink entry without a target")]
    MissingLinkTarget,

    #[error("{field} too long: {len} bytes, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("path {0:?} is listed more than once")]
    DuplicatePath(String),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("stream ends without a manifest")]
    MissingManifest,

    #[error("trailing data after manifest")]
    TrailingData,
}

/// Coarse classification of a [`StreamError`], looking through entry context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    Integrity,
    PathSafety,
    Conflict,
    Setup,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("format error at offset {offset}: {reason}")]
    Format { offset: u64, reason: FormatReason },

    #[error("cannot encode entry: {0}")]
    Unencodable(FormatReason),

    #[error(
        "{what} checksum mismatch at offset {offset}: stored 0x{expected:08X}, computed 0x{actual:08X}"
    )]
    Integrity {
        what: Structure,
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("manifest disagrees with stream: {0}")]
    ManifestMismatch(String),

    #[error("unsafe path {path:?}: {reason}")]
    PathSafety { path: String, reason: &'static str },

    #[error("non-symlink occupies target path {}", .0.display())]
    Conflict(PathBuf),

    #[error("invalid root {}: {reason}", path.display())]
    Setup { path: PathBuf, reason: String },

    #[error("encode cancelled")]
    Cancelled,

    #[error("entry {path:?}: {source}")]
    Entry {
        path: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    pub fn format(offset: u64, reason: FormatReason) -> Self {
        StreamError::Format { offset, reason }
    }

    pub fn path_safety(path: impl Into<String>, reason: &'static str) -> Self {
        StreamError::PathSafety {
            path: path.into(),
            reason,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Io(_) => ErrorKind::Io,
            StreamError::Format { .. } | StreamError::Unencodable(_) => ErrorKind::Format,
            StreamError::Integrity { .. } | StreamError::ManifestMismatch(_) => {
                ErrorKind::Integrity
            }
            StreamError::PathSafety { .. } => ErrorKind::PathSafety,
            StreamError::Conflict(_) => ErrorKind::Conflict,
            StreamError::Setup { .. } => ErrorKind::Setup,
            StreamError::Cancelled => ErrorKind::Cancelled,
            StreamError::Entry { source, .. } => source.kind(),
        }
    }

    /// Attach the entry path, unless the error already names one.
    pub fn in_entry(self, path: &str) -> Self {
        match self {
            StreamError::Entry { .. } | StreamError::Cancelled => self,
            other => StreamError::Entry {
                path: path.to_string(),
                source: Box::new(other),
            },
        }
    }
}

// A StreamError that crossed a `Read`/`Write` boundary travels inside an
// io::Error; unwrap it again so callers see the original variant.
impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        let ours = err
            .get_ref()
            .is_some_and(|inner| inner.is::<StreamError>());
        if !ours {
            return StreamError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<StreamError>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => StreamError::Io(io::Error::other(other)),
            None => StreamError::Io(io::Error::other("empty error")),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(inner) => inner,
            other => io::Error::other(other),
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_entry_context() {
        let err = StreamError::Integrity {
            what: Structure::Chunk,
            offset: 42,
            expected: 1,
            actual: 2,
        }
        .in_entry("a/b.txt");
        assert_eq!(err.kind(), ErrorKind::Integrity);
        let msg = err.to_string();
        assert!(msg.contains("a/b.txt"), "{msg}");
        assert!(msg.contains("offset 42"), "{msg}");
    }

    #[test]
    fn stream_error_survives_io_round_trip() {
        let io_err: io::Error = StreamError::format(7, FormatReason::EmptyChunk).into();
        let back = StreamError::from(io_err);
        assert!(matches!(
            back,
            StreamError::Format {
                offset: 7,
                reason: FormatReason::EmptyChunk
            }
        ));
    }

    #[test]
    fn plain_io_error_stays_io() {
        let err = StreamError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn cancelled_is_not_wrapped() {
        let err = StreamError::Cancelled.in_entry("x");
        assert!(matches!(err, StreamError::Cancelled));
    }
}
