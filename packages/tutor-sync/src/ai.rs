//! Generative speech collaborator, as seen by the audio cache.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("speech generation request failed: {0}")]
    Request(String),

    #[error("malformed speech response: {0}")]
    Malformed(String),

    #[error("no speech synthesizer configured")]
    Unavailable,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Raw PCM for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AiError>;
}
