use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use studyrag_context::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, RecursiveSplitter, decode_utf8_dropping_invalid,
};
use tracing_subscriber::EnvFilter;

/// Split a text file into overlapping fragments and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    input: Option<PathBuf>,

    /// Maximum fragment length, in characters.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between consecutive fragments.
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let content = match &args.input {
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            decode_utf8_dropping_invalid(&bytes)
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let splitter = RecursiveSplitter::new(args.chunk_size, args.chunk_overlap)?;
    let chunks = splitter.get_chunks(&content);
    tracing::info!(
        "Split {} characters into {} fragments",
        content.chars().count(),
        chunks.len()
    );

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}
