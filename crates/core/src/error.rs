//! Error types for deck generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a chat request into a deck.
///
/// Display strings name the category of the offending input and never
/// include the input itself.
#[derive(Error, Debug)]
pub enum Error {
    /// The input text is longer than the configured limit.
    #[error("Input too large: {len} characters exceeds the limit of {max}")]
    InputTooLarge { len: usize, max: usize },

    /// No usable intent could be extracted from the message.
    #[error("Intent extraction failed: {0}")]
    IntentExtractionFailed(String),

    /// The document builder produced a deck that breaks a structural rule.
    /// This indicates a logic bug rather than bad input.
    #[error("Internal error: deck invariant violated: {0}")]
    BuildInvariantViolation(String),

    /// Writing one of the output artifacts failed.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// The chat request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A path derived from user text would leave its directory.
    #[error("Unsafe path rejected: {0}")]
    UnsafePath(String),

    /// Configuration values are missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The owning request was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// Underlying file-system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single chart or diagram render.
///
/// These never escape the renderer: the fallback policy turns every one of
/// them into a placeholder asset.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The chart or diagram specification is malformed.
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// The specification exceeds the configured complexity limits.
    #[error("Spec too complex: {0}")]
    TooComplex(String),

    /// The rasterization backend failed.
    #[error("Render backend error: {0}")]
    Backend(String),

    /// Writing the image failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the LLM collaborator.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The provider did not answer within the configured timeout.
    #[error("LLM call timed out after {0} seconds")]
    Timeout(u64),

    /// No completer is available for the requested provider.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// The response exceeded the configured size limit.
    #[error("LLM response too large: {len} characters exceeds the limit of {max}")]
    ResponseTooLarge { len: usize, max: usize },

    /// The provider reported an error.
    #[error("LLM provider error: {0}")]
    Provider(String),
}
