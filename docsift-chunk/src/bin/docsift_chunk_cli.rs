use clap::Parser;
use docsift_chunk::text::{Chunker, ChunkerConfig, DEFAULT_SHORT_PARAGRAPH_WORDS, DEFAULT_TARGET_WORDS};
use std::fs;
use std::io::{self, Read};

/// A CLI tool to chunk extracted document text into JSON output using docsift-chunk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Document identifier recorded on every chunk.
    #[arg(short, long, default_value = "stdin")]
    document_id: String,

    /// Paragraphs with fewer words than this are kept whole.
    #[arg(long, default_value_t = DEFAULT_SHORT_PARAGRAPH_WORDS)]
    short_paragraph_words: usize,

    /// Word count at which long paragraphs are cut into a new chunk.
    #[arg(long, default_value_t = DEFAULT_TARGET_WORDS)]
    target_words: usize,

    /// Treat form feed characters as page breaks.
    #[arg(long)]
    split_pages: bool,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let chunker = Chunker::new(ChunkerConfig {
        short_paragraph_words: args.short_paragraph_words,
        target_words: args.target_words,
    });

    let chunks = if args.split_pages {
        let pages: Vec<&str> = file_content.split('\u{000C}').collect();
        chunker.chunk_pages(&pages, &args.document_id)
    } else {
        chunker.chunk(&file_content, &args.document_id)
    };

    let json_output = serde_json::to_string_pretty(&chunks)
        .map_err(|e| io::Error::other(format!("Failed to serialize chunks to JSON: {e}")))?;

    println!("{json_output}");

    Ok(())
}
