//! Hand-off to a theme synthesis service.
//!
//! The service itself (usually a language model) lives outside this crate. This
//! module only builds the prompt it receives and defines the seam.

use async_trait::async_trait;
use docsift_chunk::Chunk;

/// Returned in place of a summary when the service fails.
pub const THEME_FAILURE_MESSAGE: &str = "Theme synthesis failed.";

#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    #[error("Theme service failed: {message}")]
    Service { message: String },

    #[error("Theme synthesis failed: {source}")]
    Other {
        #[from]
        source: anyhow::Error,
    },
}

#[async_trait]
pub trait ThemeSynthesizer: Send + Sync {
    /// Turns a prompt built by [`build_theme_prompt`] into free text.
    async fn synthesize(&self, prompt: &str) -> Result<String, ThemeError>;
}

pub fn build_theme_prompt(query: &str, chunks: &[Chunk]) -> String {
    let listed = chunks
        .iter()
        .map(|c| {
            format!(
                "- {} (Document: {}, Page: {}, Paragraph: {})",
                c.text, c.document_id, c.page, c.paragraph
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given the following extracted text chunks in response to the query: \"{query}\", group them into main themes.\n\
         For each theme, provide:\n\
         - A short, chat-style summary\n\
         - Supporting document citations (document name, page, paragraph)\n\
         \n\
         Chunks:\n\
         {listed}\n\
         \n\
         Return your answer as a list of themes, each with a summary and citations.\n"
    )
}
