//! # Collector Core
//!
//! Core types and batch archiving for the NATS batch collector.
//!
//! The collector sits between an inbound subject and an outbound subject on
//! a JetStream broker: it accumulates messages into bounded batches, archives
//! each batch, republishes the archive, and only then acknowledges the
//! originating messages — at-least-once batching.
//!
//! This crate holds everything broker-independent: the message and batch
//! types, the `Acker` seam, the archiver, configuration, errors, and metrics.

pub mod archive;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;

pub use archive::*;
pub use config::*;
pub use error::*;
pub use message::*;
pub use metrics::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::archive::archive_batch;
    pub use crate::config::CollectorConfig;
    pub use crate::error::{CollectorError, Result};
    pub use crate::message::{
        Acker, Batch, CompletedBatch, FlushReason, InboundMessage, RecordingAcker,
    };
    pub use crate::metrics::CollectorMetrics;
}
