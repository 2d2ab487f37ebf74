//! Error types for store operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("Conflict updating {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: String,
        message: String,
    },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Api(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Api(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 409),
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // A refetch on the next attempt resolves stale versions
            StoreError::Conflict { .. } => true,
            StoreError::NotFound { .. } => true,
            StoreError::AlreadyExists { .. } => true,
            StoreError::Api(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 404 || code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            StoreError::Invalid(_) => false,
            StoreError::Serialization(_) => false,
        }
    }
}
