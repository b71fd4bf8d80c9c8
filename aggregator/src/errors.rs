use crate::store::StoreError;
use crate::upstream::UpstreamError;

/// Errors surfaced by the orchestrators to their callers.
#[derive(thiserror::Error, Debug)]
pub enum AggregatorError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("deadline exceeded: {0}")]
    Timeout(String),
    #[error("malformed upstream payload: {0}")]
    Decode(String),
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl From<UpstreamError> for AggregatorError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, body, .. } => AggregatorError::Upstream {
                status: status.as_u16(),
                body,
            },
            UpstreamError::Decode { .. } => AggregatorError::Decode(err.to_string()),
            UpstreamError::Timeout(_) => AggregatorError::Timeout(err.to_string()),
            UpstreamError::Transport(_) | UpstreamError::InvalidUrl(_) => {
                AggregatorError::Transport(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for AggregatorError {
    fn from(err: sqlx::Error) -> Self {
        AggregatorError::Persistence(StoreError::from(err))
    }
}
