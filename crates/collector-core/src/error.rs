//! Error types for the batch collector.
//!
//! Uses `thiserror` with full source preservation. Only configuration and
//! startup errors are expected to terminate the process; steady-state NATS
//! failures are logged by the pipeline and survived.

use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Primary error type for all collector operations
#[derive(Error, Debug)]
pub enum CollectorError {
    /// NATS connection, consumer, publish, or ack errors
    #[error("NATS error: {message}")]
    Nats {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Batch archiving errors
    #[error("archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl CollectorError {
    /// Create a NATS error
    pub fn nats(message: impl Into<String>) -> Self {
        Self::Nats {
            message: message.into(),
            source: None,
        }
    }

    /// Create a NATS error with source
    pub fn nats_with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Nats {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an archive error with source
    pub fn archive_with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Archive {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
