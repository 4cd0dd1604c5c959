//! Paragraph- and sentence-aware chunking of extracted document text.
//!
//! Documents arrive as plain text produced by an upstream extractor (PDF text layer,
//! OCR, a `.txt` upload). This module turns that text into [`Chunk`]s: small,
//! addressable units that carry enough positional metadata (page, paragraph,
//! sentence) to be cited back to the reader.
//!
//! The algorithm is deliberately simple and fully deterministic, because the
//! `position` assigned to each chunk is later used as its identity for
//! de-duplication and context lookup:
//!
//! 1. Split the page text on blank lines into paragraphs, trimming each one and
//!    dropping paragraphs that are empty after trimming.
//! 2. A paragraph shorter than the short-paragraph threshold (50 words by default)
//!    becomes exactly one chunk with `sentence = 1`.
//! 3. Longer paragraphs are split at `.`, `!` or `?` followed by whitespace. Sentences
//!    accumulate in a buffer which is flushed as one chunk once it holds at least the
//!    target number of words (100 by default) or when the paragraph runs out of
//!    sentences. The chunk's `sentence` is the 1-based index of the last sentence it
//!    contains.
//!
//! # Example
//!
//! ```
//! use docsift_chunk::text::Chunker;
//!
//! let chunker = Chunker::default();
//! let chunks = chunker.chunk("A short note.\n\nAnother short paragraph.", "notes.txt");
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "A short note.");
//! assert_eq!(chunks[1].paragraph, 2);
//! assert_eq!(chunks[1].position, 1);
//! ```
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Paragraphs shorter than this many words are kept whole.
pub const DEFAULT_SHORT_PARAGRAPH_WORDS: usize = 50;

/// Word count at which the sentence buffer of a long paragraph is flushed.
pub const DEFAULT_TARGET_WORDS: usize = 100;

/// Two newlines with nothing but whitespace between them.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern is valid"));

/// Sentence terminator followed by whitespace. The terminator stays with its sentence.
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence break pattern is valid"));

/// An addressable unit of document text.
///
/// `page`, `paragraph` and `sentence` are 1-based and locate the chunk inside its
/// source document. `position` is the zero-based index of the chunk in the flat
/// sequence of every indexed chunk; the chunker numbers its own output from zero
/// and the corpus that stores the chunks shifts them with [`Chunk::with_position`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text, never empty.
    pub text: String,
    /// Identifier of the source document (usually the uploaded file name).
    pub document_id: String,
    pub page: u32,
    pub paragraph: u32,
    pub sentence: u32,
    pub position: usize,
}

impl Chunk {
    /// Returns the same chunk placed at `position` in a larger sequence.
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Number of whitespace-separated words in the chunk text.
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Tunables for [`Chunker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Paragraphs with fewer words than this are emitted as a single chunk.
    pub short_paragraph_words: usize,
    /// Target word count for chunks cut from long paragraphs.
    pub target_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            short_paragraph_words: DEFAULT_SHORT_PARAGRAPH_WORDS,
            target_words: DEFAULT_TARGET_WORDS,
        }
    }
}

/// Splits extracted text into [`Chunk`]s. See the module docs for the algorithm.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Creates a chunker with explicit thresholds.
    ///
    /// # Examples
    ///
    /// ```
    /// use docsift_chunk::text::{Chunker, ChunkerConfig};
    ///
    /// let chunker = Chunker::new(ChunkerConfig { short_paragraph_words: 5, target_words: 8 });
    /// let chunks = chunker.chunk("One two three. Four five six. Seven eight nine.", "doc");
    ///
    /// // nine words: the paragraph is long, the first flush happens after the third sentence
    /// assert_eq!(chunks.len(), 1);
    /// assert_eq!(chunks[0].sentence, 3);
    /// ```
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks single-page text. Every chunk gets `page = 1`.
    pub fn chunk(&self, text: &str, document_id: &str) -> Vec<Chunk> {
        self.chunk_page(text, document_id, 1)
    }

    /// Chunks the text of one known page.
    pub fn chunk_page(&self, text: &str, document_id: &str, page: u32) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        self.push_page(text, document_id, page, &mut chunks);
        chunks
    }

    /// Chunks a document supplied page by page. Pages are numbered from 1 in slice
    /// order and positions run continuously across pages.
    pub fn chunk_pages<S: AsRef<str>>(&self, pages: &[S], document_id: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            let page_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            self.push_page(page.as_ref(), document_id, page_number, &mut chunks);
        }
        chunks
    }

    fn push_page(&self, text: &str, document_id: &str, page: u32, out: &mut Vec<Chunk>) {
        let paragraphs = PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty());

        for (index, paragraph) in paragraphs.enumerate() {
            let paragraph_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let mut emit = |text: String, sentence: usize| {
                out.push(Chunk {
                    text,
                    document_id: document_id.to_string(),
                    page,
                    paragraph: paragraph_number,
                    sentence: u32::try_from(sentence).unwrap_or(u32::MAX),
                    position: out.len(),
                });
            };

            if word_count(paragraph) < self.config.short_paragraph_words {
                emit(paragraph.to_string(), 1);
                continue;
            }

            let sentences = split_sentences(paragraph);
            let total = sentences.len();
            let mut buffer: Vec<&str> = Vec::new();
            let mut buffered_words = 0;
            let mut last_included = 0;

            for (index, sentence) in sentences.into_iter().enumerate() {
                let number = index + 1;
                let sentence = sentence.trim();
                if sentence.is_empty() {
                    continue;
                }

                buffer.push(sentence);
                buffered_words += word_count(sentence);
                last_included = number;

                if buffered_words >= self.config.target_words || number == total {
                    emit(buffer.join(" "), number);
                    buffer.clear();
                    buffered_words = 0;
                }
            }

            // only reachable when trailing sentences were blank
            if !buffer.is_empty() {
                emit(buffer.join(" "), last_included);
            }
        }
    }
}

/// Splits a paragraph after every sentence terminator that is followed by whitespace.
/// Text without any terminator comes back as a single sentence.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for mat in SENTENCE_BREAK.find_iter(paragraph) {
        // terminators are single-byte ASCII
        let end = mat.start() + 1;
        sentences.push(&paragraph[start..end]);
        start = mat.end();
    }

    if start < paragraph.len() {
        sentences.push(&paragraph[start..]);
    }

    sentences
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
