use crate::container::chunk::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::pack::pipe::CancelToken;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct EncodeOptions {
    /// Maximum payload bytes per chunk. 0 means the default; values above
    /// `MAX_CHUNK_SIZE` are capped.
    pub chunk_size: usize,
    /// Buffers the producer may run ahead of the consumer.
    pub channel_depth: usize,
    /// How long `EncodedStream::read` waits for the next buffer.
    /// `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_depth: 8,
            read_timeout: None,
            cancel: CancelToken::new(),
        }
    }
}

impl EncodeOptions {
    pub(crate) fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size.min(MAX_CHUNK_SIZE)
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// Fail on any structural anomaly instead of attempting recovery.
    pub strict: bool,
    /// Treat a stream that ends before a manifest as malformed. Off by
    /// default: a stream that stops cleanly at an entry boundary is complete.
    pub require_manifest: bool,
    /// Largest chunk payload accepted; bounds every allocation driven by the
    /// stream. 0 means the default, anything above `MAX_CHUNK_SIZE` is capped.
    pub max_chunk_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict: false,
            require_manifest: false,
            max_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl DecodeOptions {
    pub(crate) fn effective_max_chunk(&self) -> usize {
        if self.max_chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.max_chunk_size.min(MAX_CHUNK_SIZE)
        }
    }
}
