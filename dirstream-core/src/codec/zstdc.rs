use super::{CodecId, Compressor};
use crate::error::Result;
use std::io::{Read, Write};

/// Wraps a whole encoded stream in one zstd frame.
///
/// Chunk and header checksums are verified after decompression. `reader`
/// feeds the decoder incrementally instead of inflating the frame to memory.
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn id(&self) -> CodecId {
        CodecId::Zstd
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: i32) -> Result<u64> {
        let mut enc = zstd::stream::Encoder::new(dst, level.max(1))?;
        #[cfg(feature = "zstdmt")]
        {
            let workers = std::thread::available_parallelism().map_or(1, |n| n.get() as u32);
            let _ = enc.multithread(workers);
        }
        let consumed = std::io::copy(src, &mut enc)?;
        // finish() reports the final frame write, auto_finish would swallow it
        enc.finish()?;
        Ok(consumed)
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = zstd::stream::Decoder::new(src)?;
        Ok(std::io::copy(&mut dec, dst)?)
    }

    fn reader<'a>(&self, src: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(zstd::stream::read::Decoder::new(src)?))
    }
}
