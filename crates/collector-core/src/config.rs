//! Configuration for the batch collector.
//!
//! Uses the `config` crate for layered configuration: built-in defaults, an
//! optional file, then `COLLECTOR__`-prefixed environment variables.

use crate::error::{CollectorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration, immutable after load
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectorConfig {
    /// NATS connection configuration
    #[serde(default)]
    pub nats: NatsConfig,

    /// Inbound subject and consumer configuration
    #[serde(default)]
    pub inbound: InboundConfig,

    /// Outbound subject configuration
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// Batch accumulation configuration
    #[serde(default)]
    pub batching: BatchingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub url: String,

    /// Connection name (for monitoring)
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_connection_name() -> String {
    "batch-collector".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            connection_name: default_connection_name(),
        }
    }
}

/// Inbound subject and consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundConfig {
    /// Stream the inbound subject belongs to
    #[serde(default = "default_inbound_stream")]
    pub stream: String,

    /// Subject to consume messages from
    #[serde(default = "default_inbound_subject")]
    pub subject: String,

    /// Durable consumer name for crash-resumable subscriptions
    #[serde(default = "default_durable_name")]
    pub durable_name: Option<String>,

    /// Optional queue group for load-shared subscription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_group: Option<String>,
}

fn default_inbound_stream() -> String {
    "HL7".to_string()
}

fn default_inbound_subject() -> String {
    "HL7.INCOMING".to_string()
}

fn default_durable_name() -> Option<String> {
    Some("MESSAGES".to_string())
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            stream: default_inbound_stream(),
            subject: default_inbound_subject(),
            durable_name: default_durable_name(),
            queue_group: None,
        }
    }
}

/// Outbound subject configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Stream the archives are published into
    #[serde(default = "default_outbound_stream")]
    pub stream: String,

    /// Subject to publish archived batches to
    #[serde(default = "default_outbound_subject")]
    pub subject: String,
}

fn default_outbound_stream() -> String {
    "HL7STR".to_string()
}

fn default_outbound_subject() -> String {
    "HL7STR.ENCRYPTED_BATCHES".to_string()
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            stream: default_outbound_stream(),
            subject: default_outbound_subject(),
        }
    }
}

/// Batch accumulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Maximum messages per batch
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Idle time after the most recent arrival before a partial batch flushes
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
}

fn default_max_messages() -> usize {
    10
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(9)
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl BatchingConfig {
    /// Capacity of the bounded inbound queue, sized to absorb a burst of two
    /// full batches without stalling the delivery path
    pub fn queue_capacity(&self) -> usize {
        self.max_messages * 2
    }

    /// Ack-wait window for the durable consumer, twice the idle timeout so a
    /// batch always flushes before its members become eligible for redelivery
    pub fn ack_wait(&self) -> Duration {
        self.idle_timeout * 2
    }

    /// Pending-ack bound for the durable consumer
    pub fn max_ack_pending(&self) -> i64 {
        self.max_messages as i64 + 1
    }
}

impl CollectorConfig {
    /// Load configuration from defaults, an optional file, and environment
    pub fn load(path: Option<&str>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("COLLECTOR")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batching.max_messages == 0 {
            return Err(CollectorError::config("batching.max_messages must be at least 1"));
        }
        if self.batching.idle_timeout.is_zero() {
            return Err(CollectorError::config("batching.idle_timeout must be non-zero"));
        }
        Ok(())
    }
}
