use thiserror::Error;

/// Top-level error type for Parley.
///
/// Designed outcomes of a turn (an empty utterance, an unclassified request,
/// ambiguity, a missing parameter) are never represented here; they come back
/// as a `ResolvedCommand` with `clarification_needed` set. This type only
/// covers infrastructure failures around the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Open-domain backend failed: {0}")]
    Backend(String),

    #[error("Open-domain backend timed out after {0} ms")]
    BackendTimeout(u64),
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        ParleyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
