#![allow(dead_code)]

use dirstream_core::container::chunk::write_chunks;
use dirstream_core::container::header::write_header;
use dirstream_core::{EncodeOptions, Encoder, Entry, Manifest, ManifestEntry, build_file_list};
use std::path::Path;

pub fn encoder(root: &Path, chunk_size: usize) -> Encoder {
    let opts = EncodeOptions {
        chunk_size,
        ..Default::default()
    };
    Encoder::new(root, opts).unwrap()
}

/// Encode everything under `root` synchronously.
pub fn encode_tree(root: &Path, chunk_size: usize) -> Vec<u8> {
    let paths = build_file_list(root, &[]).unwrap();
    let mut out = Vec::new();
    encoder(root, chunk_size).encode_to(&paths, &mut out).unwrap();
    out
}

/// Hand-assembled streams, for content a well-behaved encoder refuses to emit.
#[derive(Default)]
pub struct StreamBuilder {
    bytes: Vec<u8>,
    manifest: Manifest,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: Entry, content: &[u8]) -> Self {
        let offset = self.bytes.len() as u64;
        write_header(&mut self.bytes, &entry).unwrap();
        write_chunks(&mut self.bytes, &mut &content[..], 4096).unwrap();
        self.manifest.push(ManifestEntry::for_entry(&entry, offset));
        self
    }

    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.manifest.write_to(&mut self.bytes).unwrap();
        self.bytes
    }

    pub fn without_manifest(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}
