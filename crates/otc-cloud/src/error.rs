//! Cloud provider error types

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(
        "timeout while waiting for state to become '{target}' (last state: '{last_status}', timeout: {}s)",
        timeout.as_secs()
    )]
    Timeout {
        last_status: String,
        target: String,
        timeout: Duration,
    },

    #[error("unexpected state '{status}', wanted target '{target}'")]
    UnexpectedState { status: String, target: String },

    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("{0}")]
    Projection(FieldErrors),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a failure should be treated by pollers and retry wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient server condition; the same call may succeed later
    Retryable,
    /// Give up and surface the error
    Fatal,
    /// The object is gone; callers decide whether that is success
    Ignorable,
}

impl CloudError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        CloudError::Api {
            status,
            message: message.into(),
        }
    }

    /// Wraps the error with a description of the failed step
    pub fn context(self, context: impl Into<String>) -> Self {
        CloudError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strips any context wrappers
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn classify(&self) -> ErrorClass {
        match self.root() {
            CloudError::NotFound(_) => ErrorClass::Ignorable,
            CloudError::Api { status: 404, .. } => ErrorClass::Ignorable,
            CloudError::Api {
                status: 409 | 429 | 500 | 502 | 503 | 504,
                ..
            } => ErrorClass::Retryable,
            CloudError::Transport(_) => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.classify() == ErrorClass::Ignorable
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), CloudError::Timeout { .. })
    }
}

/// A single field that could not be projected from an API object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field projection failure of one read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.0.len())?;
        for e in &self.0 {
            write!(f, "\n\t* {}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            CloudError::NotFound("x".into()).classify(),
            ErrorClass::Ignorable
        );
        assert_eq!(CloudError::api(404, "gone").classify(), ErrorClass::Ignorable);
        assert_eq!(CloudError::api(409, "busy").classify(), ErrorClass::Retryable);
        assert_eq!(CloudError::api(503, "down").classify(), ErrorClass::Retryable);
        assert_eq!(CloudError::api(400, "bad").classify(), ErrorClass::Fatal);
        assert_eq!(
            CloudError::Precondition("shrink".into()).classify(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_classify_sees_through_context() {
        let err = CloudError::NotFound("share".into()).context("reading share");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "reading share: Resource not found: share");
    }

    #[test]
    fn test_field_errors_display() {
        let mut errors = FieldErrors::default();
        errors.push("size", "invalid float");
        errors.push("name", "missing");
        let rendered = CloudError::Projection(errors).to_string();
        assert!(rendered.starts_with("2 error(s) occurred:"));
        assert!(rendered.contains("size: invalid float"));
        assert!(rendered.contains("name: missing"));
    }
}
