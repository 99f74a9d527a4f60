//! Message and batch types flowing through the collector pipeline.
//!
//! An `InboundMessage` is created by the ingestion adapter on delivery and is
//! consumed exactly once by the accumulator. Its ack handle is retained until
//! the batch containing it has been durably republished downstream.

use crate::error::{CollectorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Capability to acknowledge a delivered message back to the broker.
///
/// Held exclusively by whichever component currently owns the message.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Mark the message as processed.
    async fn ack(&self) -> Result<()>;
}

/// One message received from the inbound subject.
#[derive(Clone)]
pub struct InboundMessage {
    /// Raw payload bytes, carried verbatim into the archive
    pub payload: Bytes,

    /// Broker-assigned stream sequence number
    pub stream_sequence: u64,

    /// Broker-assigned publish timestamp; `None` when the delivery carried
    /// no JetStream metadata
    pub published: Option<DateTime<Utc>>,

    acker: Arc<dyn Acker>,
}

impl InboundMessage {
    pub fn new(
        payload: Bytes,
        stream_sequence: u64,
        published: Option<DateTime<Utc>>,
        acker: Arc<dyn Acker>,
    ) -> Self {
        Self {
            payload,
            stream_sequence,
            published,
            acker,
        }
    }

    /// Clone out the ack handle for this message.
    pub fn acker(&self) -> Arc<dyn Acker> {
        Arc::clone(&self.acker)
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("payload_len", &self.payload.len())
            .field("stream_sequence", &self.stream_sequence)
            .field("published", &self.published)
            .finish()
    }
}

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The batch reached the configured size bound
    Size,
    /// The idle timeout elapsed since the last arrival
    IdleTimeout,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size => write!(f, "size"),
            Self::IdleTimeout => write!(f, "idle_timeout"),
        }
    }
}

/// Ordered collection of inbound messages, bounded by the configured batch
/// size and immutable once handed to the publish loop.
#[derive(Debug, Default)]
pub struct Batch {
    messages: Vec<InboundMessage>,
}

impl Batch {
    /// Create a batch with capacity hint
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
        }
    }

    /// Append a message in arrival order
    pub fn push(&mut self, message: InboundMessage) {
        self.messages.push(message);
    }

    /// Number of messages in the batch
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate over messages in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &InboundMessage> {
        self.messages.iter()
    }

    /// The most recently appended message
    pub fn last(&self) -> Option<&InboundMessage> {
        self.messages.last()
    }

    /// Take the accumulated contents, leaving an empty batch behind
    pub fn take(&mut self) -> Batch {
        std::mem::take(self)
    }
}

/// A flushed batch paired with the ack handle of its last member.
///
/// The durable consumer uses cumulative acknowledgment, so acking that one
/// handle acknowledges every message in the batch.
pub struct CompletedBatch {
    pub batch: Batch,
    pub acker: Arc<dyn Acker>,
    pub reason: FlushReason,
}

// ============================================================================
// Recording Acker (for testing)
// ============================================================================

/// Ack handle that records invocations instead of talking to a broker.
pub struct RecordingAcker {
    acked: AtomicUsize,
    fail_next: AtomicBool,
}

impl RecordingAcker {
    pub fn new() -> Self {
        Self {
            acked: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Number of times `ack` succeeded
    pub fn ack_count(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    /// Make the next `ack` call fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Default for RecordingAcker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Acker for RecordingAcker {
    async fn ack(&self) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollectorError::nats("simulated ack failure"));
        }
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(seq: u64) -> (InboundMessage, Arc<RecordingAcker>) {
        let acker = Arc::new(RecordingAcker::new());
        let msg = InboundMessage::new(
            Bytes::from(format!("payload-{seq}")),
            seq,
            Some(Utc::now()),
            acker.clone(),
        );
        (msg, acker)
    }

    #[test]
    fn batch_preserves_arrival_order() {
        let mut batch = Batch::with_capacity(3);
        for seq in 1..=3 {
            batch.push(message(seq).0);
        }

        let sequences: Vec<u64> = batch.iter().map(|m| m.stream_sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(batch.last().unwrap().stream_sequence, 3);
    }

    #[test]
    fn take_resets_the_buffer() {
        let mut batch = Batch::with_capacity(2);
        batch.push(message(1).0);

        let taken = batch.take();
        assert_eq!(taken.len(), 1);
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn recording_acker_counts_and_fails_on_demand() {
        let acker = RecordingAcker::new();
        acker.ack().await.unwrap();
        assert_eq!(acker.ack_count(), 1);

        acker.fail_next();
        assert!(acker.ack().await.is_err());
        assert_eq!(acker.ack_count(), 1);

        acker.ack().await.unwrap();
        assert_eq!(acker.ack_count(), 2);
    }
}
