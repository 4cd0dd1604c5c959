//! Context windows around matched chunks.

use docsift_chunk::Chunk;

pub const DEFAULT_CONTEXT_WINDOW: usize = 2;

/// Joins the text of the chunks within `window` positions of `position`, in order.
///
/// The window is clipped to the sequence. A position outside the sequence, or an
/// empty sequence, yields an empty string.
pub fn context(chunks: &[Chunk], position: usize, window: usize) -> String {
    if position >= chunks.len() {
        return String::new();
    }

    let start = position.saturating_sub(window);
    let end = position.saturating_add(window).min(chunks.len() - 1);

    chunks[start..=end]
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    window: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}

impl ContextAssembler {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn assemble(&self, chunks: &[Chunk], position: usize) -> String {
        context(chunks, position, self.window)
    }
}
