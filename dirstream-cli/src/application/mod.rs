pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use dirstream_core::error::Result;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Encode {
            source,
            output,
            chunk_size,
            excludes,
            codec,
            level,
        } => handlers::handle_encode(source, output, chunk_size, excludes, codec, level),
        Commands::Decode {
            input,
            dest,
            strict,
            chunk_size,
            codec,
        } => handlers::handle_decode(input, dest, strict, chunk_size, codec),
        Commands::List { input, json, codec } => handlers::handle_list(input, json, codec),
        Commands::Verify { input, codec } => handlers::handle_verify(input, codec),
    }
}
