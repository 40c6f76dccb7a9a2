#![forbid(unsafe_code)]

pub mod error;
pub mod options;

pub mod util {
    pub mod counting;
    pub mod fsmeta;
    pub mod sanitize;
}

pub mod container {
    pub mod chunk;
    pub mod entry;
    pub mod header;
    pub mod manifest;
}

pub mod codec;

pub mod pack {
    pub mod encoder;
    pub mod pipe;
    pub mod walker;
}

pub mod read {
    pub mod decode;
    pub mod inspect;
    pub mod recover;
    pub mod stream;
    pub mod walk;
}

// Re-exports: stable API surface
pub use codec::{CodecId, Compressor, compressor_for};
pub use container::entry::{Entry, EntryType};
pub use container::manifest::{Manifest, ManifestEntry};
pub use error::{ErrorKind, Result, StreamError};
pub use options::{DecodeOptions, EncodeOptions};
pub use pack::encoder::{EncodeSummary, Encoder};
pub use pack::pipe::{CancelToken, EncodedStream};
pub use pack::walker::build_file_list;
pub use read::decode::{DecodeReport, Decoder};
pub use read::inspect::{InspectedEntry, StreamIndex, inspect};
