//! Error types for the reconcilers

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Error variants are named with the `Error` suffix for clarity (e.g., `StoreError`, `ValidationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A dependency the reconciled object points at does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A dependency exists but has not converged yet
    #[error("Resource not ready: {0}")]
    NotReady(String),

    #[error("Expected exactly one web process for app {app}, found {count}")]
    AmbiguousProcess { app: String, count: usize },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transient error (will retry): {0}")]
    TransientError(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::StoreError(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Non-retryable errors will not resolve without a change to the object
    /// itself (or to the controller configuration).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StoreError(e) => e.is_retryable(),
            Error::TransientError(_) => true,
            // Dependencies might appear or converge later
            Error::NotFound(_) => true,
            Error::NotReady(_) => true,
            Error::AmbiguousProcess { .. } => true,
            Error::InvalidConfig(_) => false,
            Error::ValidationError(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }

    /// CamelCase reason used on status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            Error::StoreError(e) if e.is_conflict() => "Conflict",
            Error::StoreError(_) => "StoreError",
            Error::SerializationError(_) => "SerializationError",
            Error::MissingObjectKey(_) => "MissingObjectKey",
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::NotFound(_) => "NotFound",
            Error::NotReady(_) => "NotReady",
            Error::AmbiguousProcess { .. } => "AmbiguousProcess",
            Error::ValidationError(_) => "InvalidSpec",
            Error::TransientError(_) => "TransientError",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max_secs = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        // powi overflows to infinity for large attempts; clamp before jitter
        // so the range never becomes inf - inf
        let base_delay_secs =
            (self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent)).min(max_secs);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(max_secs);

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Permanent errors wait for the object to change; the slow requeue
            // only picks up fixes that arrive without a watch event
            self.max_delay
        }
    }
}

/// Per-object error tracking between reconciles
///
/// Dropped from the engine's map on success.
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    /// Number of consecutive errors
    pub consecutive_errors: u32,
}

impl ErrorContext {
    pub fn record_error(&mut self) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
    }
}
