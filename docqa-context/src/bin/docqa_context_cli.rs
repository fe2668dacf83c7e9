use anyhow::Result;
use clap::Parser;
use docqa_context::text::{DEFAULT_BOUNDARY_LOOKBACK, TextSpan, TextSplitter};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// A CLI tool to split a document into overlapping chunks, printed as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source identifier recorded with each chunk.
    #[arg(short, long, default_value = "stdin")]
    source: String,

    /// Maximum chunk length in characters.
    #[arg(short = 'c', long, default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(short = 'o', long, default_value_t = 50)]
    chunk_overlap: usize,

    /// How far back from a window edge to look for a paragraph or sentence break.
    #[arg(short, long, default_value_t = DEFAULT_BOUNDARY_LOOKBACK)]
    lookback: usize,

    /// Comma-separated list of regex boundary patterns, most significant first.
    #[arg(short, long, value_delimiter = ',')]
    boundaries: Option<Vec<String>>,
}

#[derive(Serialize)]
struct SerializableChunk<'a> {
    source: &'a str,
    sequence: usize,
    #[serde(flatten)]
    span: &'a TextSpan,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (content, source) = if let Some(input_path) = args.input {
        (fs::read_to_string(&input_path)?, input_path)
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        (buffer, args.source)
    };

    let mut splitter =
        TextSplitter::new(args.chunk_size, args.chunk_overlap)?.with_lookback(args.lookback);
    if let Some(patterns) = &args.boundaries {
        let refs: Vec<&str> = patterns.iter().map(|s| s.as_str()).collect();
        splitter = splitter.with_boundaries(&refs)?;
    }

    let spans = splitter.split(&content);
    let chunks: Vec<SerializableChunk> = spans
        .iter()
        .enumerate()
        .map(|(sequence, span)| SerializableChunk {
            source: &source,
            sequence,
            span,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&chunks)?);

    Ok(())
}
