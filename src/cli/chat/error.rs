//! Error types for the chat pipeline.
//!
//! Each failure domain gets its own enum so the orchestrator can apply a
//! different policy per domain: translation failures abort or fall back
//! depending on direction, augmentation failures degrade to an empty digest,
//! generation failures become visible reply text, and persistence failures
//! are logged while the session continues in memory.

use thiserror::Error;

/// Translation backend failures.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Http(String),

    #[error("could not parse translation response: {0}")]
    Parse(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Web search / news augmentation failures. Always swallowed by the
/// orchestrator and replaced with an empty digest.
#[derive(Debug, Error)]
pub enum AugmentationError {
    #[error("search request failed: {0}")]
    Http(String),

    #[error("could not parse search results: {0}")]
    Parse(String),

    #[error("search timed out after {0} seconds")]
    Timeout(u64),
}

/// Generation backend failures. Converted into an in-band diagnostic reply
/// by the response generator, never propagated past it.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("could not connect to the generation backend: {0}")]
    Connect(String),

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Speech capture failures, counted by the voice loop controller.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no speech capture command configured")]
    Unavailable,

    #[error("no speech detected within {0} seconds")]
    Timeout(u64),

    #[error("speech capture failed: {0}")]
    Failed(String),
}

/// Speech synthesis failures. Best effort; a failed synthesis never aborts
/// the turn that produced the text.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech synthesis failed: {0}")]
    Failed(String),
}

/// History persistence failures. Fatal to the write, not to the session.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt history file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("no such archived chat: {0}")]
    NoSuchArchive(String),
}
