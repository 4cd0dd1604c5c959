pub mod text;

pub use text::{Chunk, Chunker, ChunkerConfig, DEFAULT_SHORT_PARAGRAPH_WORDS, DEFAULT_TARGET_WORDS};
