use common::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer from the backend. The body is kept for logs only.
    #[error("Backend answered {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("No subscription link in backend response")]
    NoLinkInResponse,

    #[error("Invalid server credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid server base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Unexpected backend response: {0}")]
    InvalidResponse(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl ProviderError {
    /// Problems in the stored server row. Retrying cannot fix them.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidCredentials(_) | ProviderError::InvalidBaseUrl(_)
        )
    }
}

impl From<ProviderError> for AppError {
    fn from(error: ProviderError) -> Self {
        if error.is_configuration() {
            AppError::Configuration(error.to_string())
        } else {
            AppError::Internal(format!("VPN backend error: {}", error))
        }
    }
}
