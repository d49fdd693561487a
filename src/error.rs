//! Error types for the exam generation pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by an external capability (research or generation provider)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    #[error("Transient network failure: {0}")]
    Transient(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Test not found: {0}")]
    TestNotFound(u64),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record encoding error: {0}")]
    Codec(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

/// Pipeline error taxonomy.
///
/// Cloneable so that a single terminal error can be delivered to every caller
/// subscribed to the same run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Rate limited by provider: {message}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Provider authentication failed: {0}")]
    Auth(String),

    #[error("Provider rejected the request: {0}")]
    MalformedRequest(String),

    #[error("Generated content failed validation: {0}")]
    ContentValidation(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Pipeline did not finish within {timeout_secs}s")]
    PipelineTimeout { timeout_secs: u64 },

    #[error("Cache entry {key} is corrupt: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("{stage} failed after {attempts} attempts over {elapsed_ms}ms: {last}")]
    RetriesExhausted {
        stage: String,
        attempts: u32,
        elapsed_ms: u128,
        last: Box<PipelineError>,
    },

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable, machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::TransientNetwork(_) => "TRANSIENT_NETWORK_ERROR",
            PipelineError::RateLimit { .. } => "RATE_LIMIT_ERROR",
            PipelineError::Auth(_) => "AUTH_ERROR",
            PipelineError::MalformedRequest(_) => "MALFORMED_REQUEST",
            PipelineError::ContentValidation(_) => "CONTENT_VALIDATION_ERROR",
            PipelineError::Persistence(_) => "PERSISTENCE_ERROR",
            PipelineError::PipelineTimeout { .. } => "PIPELINE_TIMEOUT",
            PipelineError::CacheCorruption { .. } => "CACHE_CORRUPTION",
            PipelineError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
            PipelineError::Config(_) => "CONFIG_ERROR",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The innermost error, unwrapping retry exhaustion
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<CapabilityError> for PipelineError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Transient(msg) => PipelineError::TransientNetwork(msg),
            CapabilityError::RateLimited {
                message,
                retry_after,
            } => PipelineError::RateLimit {
                message,
                retry_after_secs: retry_after.map(|d| d.as_secs()),
            },
            CapabilityError::Auth(msg) => PipelineError::Auth(msg),
            CapabilityError::MalformedRequest(msg) => PipelineError::MalformedRequest(msg),
            CapabilityError::MalformedOutput(msg) => PipelineError::ContentValidation(msg),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Caller-facing error shape: stable code plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}
