//! Optional whole-stream compression applied outside the container format.

use crate::error::Result;
use std::io::{Read, Write};

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    Store = 0,
    Zstd = 1,
}

pub trait Compressor: Send + Sync {
    fn id(&self) -> CodecId;
    /// Returns the number of uncompressed bytes consumed from `src`.
    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: i32) -> Result<u64>;
    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64>;
    /// Streaming view of the decompressed bytes of `src`.
    fn reader<'a>(&self, src: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>>;
}

pub fn compressor_for(id: CodecId) -> Box<dyn Compressor> {
    match id {
        CodecId::Store => Box::new(store::Store),
        CodecId::Zstd => Box::new(zstdc::ZstdCompressor),
    }
}

pub mod store;
pub mod zstdc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_codec_round_trips_through_reader() {
        let data: Vec<u8> = b"dirstream ".iter().copied().cycle().take(10_000).collect();
        for id in [CodecId::Store, CodecId::Zstd] {
            let codec = compressor_for(id);
            assert_eq!(codec.id(), id);
            let mut packed = Vec::new();
            let n = codec.compress(&mut &data[..], &mut packed, 3).unwrap();
            assert_eq!(n, data.len() as u64);

            let mut back = Vec::new();
            codec
                .reader(Box::new(&packed[..]))
                .unwrap()
                .read_to_end(&mut back)
                .unwrap();
            assert_eq!(back, data, "{id:?}");
        }
    }

    #[test]
    fn compressed_stream_inspects_through_reader() {
        use crate::{DecodeOptions, EncodeOptions, Encoder, inspect};

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"alpha ".repeat(2000)).unwrap();
        let mut raw = Vec::new();
        Encoder::new(tmp.path(), EncodeOptions::default())
            .unwrap()
            .encode_to(&["a.txt"], &mut raw)
            .unwrap();

        let codec = compressor_for(CodecId::Zstd);
        let mut packed = Vec::new();
        codec.compress(&mut &raw[..], &mut packed, 3).unwrap();
        assert!(packed.len() < raw.len());

        let opts = DecodeOptions {
            strict: true,
            require_manifest: true,
            ..Default::default()
        };
        let index = inspect(codec.reader(Box::new(&packed[..])).unwrap(), &opts).unwrap();
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.stream_len, raw.len() as u64);
    }

    #[test]
    fn zstd_shrinks_repetitive_input() {
        let data = vec![b'a'; 64 * 1024];
        let mut packed = Vec::new();
        zstdc::ZstdCompressor
            .compress(&mut &data[..], &mut packed, 3)
            .unwrap();
        assert!(packed.len() < data.len() / 10);

        let mut back = Vec::new();
        zstdc::ZstdCompressor
            .decompress(&mut &packed[..], &mut back)
            .unwrap();
        assert_eq!(back, data);
    }
}
