use clap::builder::RangedU64ValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dirstream_core::CodecId;
use dirstream_core::container::chunk::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "dirstream CLI", long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

fn chunk_size_parser() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::new().range(1..=MAX_CHUNK_SIZE as u64)
}

/// Whole-file compression around the stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Codec {
    Store,
    Zstd,
}

impl From<Codec> for CodecId {
    fn from(c: Codec) -> Self {
        match c {
            Codec::Store => CodecId::Store,
            Codec::Zstd => CodecId::Zstd,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a directory tree into a stream file
    Encode {
        #[arg(long)]
        source: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Maximum payload bytes per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = chunk_size_parser())]
        chunk_size: usize,

        /// Skip files and directories with this base name (repeatable)
        #[arg(long = "exclude")]
        excludes: Vec<String>,

        #[arg(long, value_enum, default_value_t = Codec::Store)]
        codec: Codec,

        /// zstd compression level
        #[arg(long, default_value_t = 3)]
        level: i32,
    },

    /// Rebuild a directory tree from a stream file
    Decode {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        dest: PathBuf,

        /// Fail on any anomaly instead of trying to resynchronize
        #[arg(long)]
        strict: bool,

        /// Largest chunk payload to accept
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = chunk_size_parser())]
        chunk_size: usize,

        #[arg(long, value_enum, default_value_t = Codec::Store)]
        codec: Codec,
    },

    /// List stream contents
    List {
        #[arg(long)]
        input: PathBuf,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,

        #[arg(long, value_enum, default_value_t = Codec::Store)]
        codec: Codec,
    },

    /// Check every checksum and the manifest without writing anything
    Verify {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = Codec::Store)]
        codec: Codec,
    },
}
