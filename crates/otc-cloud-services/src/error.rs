//! Service-side error types

use otc_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ServiceError> for CloudError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Http(e) => CloudError::Transport(e.to_string()),
            other => CloudError::InvalidConfig(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
