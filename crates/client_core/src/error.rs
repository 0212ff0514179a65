use shared::error::{ErrorCode, ValidationErrors};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("{url} answered {status}: {detail}")]
    Status {
        url: String,
        status: u16,
        detail: String,
    },
    #[error("validation failed: {}", .0.summary())]
    Validation(ValidationErrors),
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("the API root does not list `{0}`")]
    MissingEndpoint(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
}

impl ClientError {
    /// Network level failures: nothing usable came back from the server.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::Timeout { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            ClientError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Transport { .. } => ErrorCode::Transport,
            ClientError::Timeout { .. } => ErrorCode::Timeout,
            ClientError::Status { status, .. } => ErrorCode::from_status(*status),
            ClientError::Validation(_) => ErrorCode::Validation,
            ClientError::Decode { .. } | ClientError::InvalidUrl(_) => ErrorCode::Internal,
            ClientError::MissingEndpoint(_) => ErrorCode::NotFound,
            ClientError::NotAuthenticated => ErrorCode::Unauthorized,
        }
    }
}
