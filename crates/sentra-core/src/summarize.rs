//! Opaque text summarization collaborator.
//!
//! The insight generator uses this to draft advisory text. The model
//! behind it is out of scope; the engine only depends on the
//! `Summarize(prompt) -> text` contract.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the summarization collaborator.
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("summarization unavailable: {0}")]
    Unavailable(String),
}

/// `Summarize(prompt) -> text` contract.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produces a short summary for the prompt.
    async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError>;
}

/// Deterministic fallback used when no external model is wired in.
/// Echoes a trimmed version of the prompt, which keeps insight text
/// useful and reproducible in tests.
pub struct TemplateSummarizer {
    max_len: usize,
}

impl TemplateSummarizer {
    /// Creates a summarizer with the default length cap.
    pub fn new() -> Self {
        Self { max_len: 240 }
    }
}

impl Default for TemplateSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, SummarizeError> {
        let trimmed = prompt.trim();
        if trimmed.len() <= self.max_len {
            return Ok(trimmed.to_string());
        }
        let mut cut = self.max_len;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        Ok(format!("{}…", &trimmed[..cut]))
    }
}
