use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use dirstream_core::error::Result;
use dirstream_core::{
    DecodeOptions, Decoder, EncodeOptions, Encoder, InspectedEntry, build_file_list,
    compressor_for, inspect,
};
use tracing::info;

use crate::presentation::cli::Codec;

fn open_input(input: &Path, codec: Codec) -> Result<Box<dyn Read>> {
    let file = File::open(input)?;
    compressor_for(codec.into()).reader(Box::new(BufReader::new(file)))
}

pub fn handle_encode(
    source: PathBuf,
    output: PathBuf,
    chunk_size: usize,
    excludes: Vec<String>,
    codec: Codec,
    level: i32,
) -> Result<()> {
    let opts = EncodeOptions {
        chunk_size,
        ..Default::default()
    };
    let encoder = Encoder::new(&source, opts)?;
    let paths = build_file_list(&source, &excludes)?;
    let mut stream = encoder.encode(&paths)?;

    let mut out = BufWriter::new(File::create(&output)?);
    compressor_for(codec.into()).compress(&mut stream, &mut out, level)?;
    out.flush()?;

    if let Some(s) = stream.summary() {
        info!(
            output = %output.display(),
            dirs = s.directories,
            files = s.regular_files,
            symlinks = s.symlinks,
            bytes = s.bytes,
            stream_len = s.stream_len,
            "encoded"
        );
    }
    Ok(())
}

pub fn handle_decode(
    input: PathBuf,
    dest: PathBuf,
    strict: bool,
    chunk_size: usize,
    codec: Codec,
) -> Result<()> {
    let opts = DecodeOptions {
        strict,
        max_chunk_size: chunk_size,
        ..Default::default()
    };
    let report = Decoder::new(&dest, opts).decode(open_input(&input, codec)?)?;
    info!(
        dest = %dest.display(),
        files = report.regular_files,
        bytes = report.bytes,
        resyncs = report.resyncs,
        "decoded"
    );
    Ok(())
}

fn print_entry(out: &mut impl Write, e: &InspectedEntry) -> io::Result<()> {
    let link = match &e.link_target {
        Some(t) => format!(" -> {t}"),
        None => String::new(),
    };
    writeln!(
        out,
        "{:<7} {:>6o} {:>12} {}  @{:<10} {}{}",
        e.kind.as_str(),
        e.mode & 0o7777,
        e.size,
        e.modified_utc(),
        e.header_offset,
        e.path,
        link
    )
}

pub fn handle_list(input: PathBuf, json: bool, codec: Codec) -> Result<()> {
    let index = inspect(open_input(&input, codec)?, &DecodeOptions::default())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &index.entries).map_err(io::Error::other)?;
        writeln!(out)?;
    } else {
        for e in &index.entries {
            print_entry(&mut out, e)?;
        }
    }
    Ok(())
}

pub fn handle_verify(input: PathBuf, codec: Codec) -> Result<()> {
    // A stream written by `encode` always ends in a manifest.
    let opts = DecodeOptions {
        strict: true,
        require_manifest: true,
        ..Default::default()
    };
    let index = inspect(open_input(&input, codec)?, &opts)?;
    info!(
        entries = index.entries.len(),
        bytes = index.total_bytes,
        stream_len = index.stream_len,
        "verified"
    );
    eprintln!("verify: OK");
    Ok(())
}
