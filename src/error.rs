use thiserror::Error;

/// Faults raised while acquiring and reconciling hexagon forecasts.
///
/// Identifier and item faults are recovered where they happen (the cell or
/// row is skipped). Chunk faults are excluded from the aggregate and reported
/// alongside it. Directory faults end the query cycle and reach the caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("invalid hexagon identifier {value:?}")]
    InvalidIdentifier { value: String },

    #[error("forecast chunk {index} ({size} hexagons) failed: {message}")]
    ChunkFetchFailure {
        index: usize,
        size: usize,
        message: String,
    },

    #[error("hexagon directory fetch failed: {0}")]
    DirectoryFetchFailure(String),

    #[error("malformed payload item: {reason}")]
    MalformedPayloadItem { reason: String },

    #[error("request to {url} failed: {message}")]
    Backend { url: String, message: String },
}

impl PipelineError {
    pub fn invalid_identifier(value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DirectoryFetchFailure(_) | Self::ChunkFetchFailure { .. } | Self::Backend { .. }
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
