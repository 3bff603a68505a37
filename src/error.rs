use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorycutError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing resource: {0}")]
    MissingResource(String),

    #[error("Timed out after {seconds:.1}s: {operation}")]
    Timeout { operation: String, seconds: f64 },

    #[error("Render failed: {0}")]
    RenderFailure(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorycutError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorycutError::Timeout { .. }
                | StorycutError::RenderFailure(_)
                | StorycutError::Http(_)
                | StorycutError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StorycutError>;
