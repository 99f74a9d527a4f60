//! Publish-and-acknowledge loop.
//!
//! Consumes completed batches strictly in emission order: archive, publish
//! downstream, and only on a confirmed publish acknowledge the retained
//! handle. Publish and ack failures are logged and survived; the broker's
//! ack-wait redelivery is the safety net, so nothing retries locally.

use async_nats::jetstream::Context;
use async_trait::async_trait;
use bytes::Bytes;
use collector_core::prelude::*;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Downstream destination for archived batches.
///
/// Returns the broker-assigned per-subject sequence number on success.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn publish(&self, payload: Bytes) -> Result<u64>;
}

/// Publishes archives to the outbound subject and waits for the JetStream
/// publish acknowledgment before reporting success.
pub struct JetStreamBatchSink {
    context: Context,
    subject: String,
}

impl JetStreamBatchSink {
    pub fn new(context: Context, subject: impl Into<String>) -> Self {
        Self {
            context,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl BatchSink for JetStreamBatchSink {
    async fn publish(&self, payload: Bytes) -> Result<u64> {
        let ack = self
            .context
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| CollectorError::nats_with_source("publish failed", e))?;

        let ack = ack
            .await
            .map_err(|e| CollectorError::nats_with_source("publish not acknowledged by broker", e))?;

        Ok(ack.sequence)
    }
}

/// Run the publish loop until the completed-batch channel closes.
///
/// One publish attempt and at most one ack per batch; the ack never precedes
/// a confirmed publish.
pub async fn run_publish_loop(
    mut batches: mpsc::UnboundedReceiver<CompletedBatch>,
    sink: Arc<dyn BatchSink>,
) {
    let metrics = CollectorMetrics::new("publisher");

    while let Some(completed) = batches.recv().await {
        let count = completed.batch.len();
        debug!(count, reason = %completed.reason, "sending batch");

        let payload = match archive_batch(&completed.batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, count, "failed to archive batch, leaving it unacknowledged");
                continue;
            }
        };

        let started = Instant::now();
        match sink.publish(payload).await {
            Ok(sequence) => {
                metrics.record_publish_latency(started.elapsed());
                metrics.record_batch_published(count, &completed.reason.to_string());
                info!(sequence, count, "published archived batch");

                if let Err(e) = completed.acker.ack().await {
                    metrics.record_ack_failure();
                    warn!(error = %e, count, "failed to ack batch, broker will redeliver");
                }
            }
            Err(e) => {
                metrics.record_publish_failure();
                error!(error = %e, count, "publish failed, leaving batch unacknowledged");
            }
        }
    }

    debug!("completed-batch channel closed, stopping publish loop");
}

// ============================================================================
// Mock Sink (for testing)
// ============================================================================

/// Mock batch sink for testing
pub struct MockBatchSink {
    published: RwLock<Vec<Bytes>>,
    fail_times: AtomicUsize,
    sequence: AtomicU64,
}

impl MockBatchSink {
    pub fn new() -> Self {
        Self {
            published: RwLock::new(Vec::new()),
            fail_times: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Make the next `n` publish calls fail
    pub fn fail_times(&self, n: usize) {
        self.fail_times.store(n, Ordering::SeqCst);
    }

    /// Get all published payloads
    pub async fn published(&self) -> Vec<Bytes> {
        self.published.read().await.clone()
    }
}

impl Default for MockBatchSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchSink for MockBatchSink {
    async fn publish(&self, payload: Bytes) -> Result<u64> {
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(CollectorError::nats("simulated publish failure"));
        }
        self.published.write().await.push(payload);
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;

    fn completed(sequences: &[u64], reason: FlushReason) -> (CompletedBatch, Arc<RecordingAcker>) {
        let mut batch = Batch::with_capacity(sequences.len());
        let acker = Arc::new(RecordingAcker::new());
        for &seq in sequences {
            batch.push(InboundMessage::new(
                Bytes::from(format!("payload-{seq}")),
                seq,
                Some(Utc::now()),
                acker.clone(),
            ));
        }
        let last = batch.last().expect("test batches are non-empty").acker();
        (
            CompletedBatch {
                batch,
                acker: last,
                reason,
            },
            acker,
        )
    }

    #[tokio::test]
    async fn acks_only_after_confirmed_publish() {
        let sink = Arc::new(MockBatchSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_publish_loop(rx, sink.clone()));

        let (batch, acker) = completed(&[1, 2, 3], FlushReason::Size);
        tx.send(batch).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(sink.published().await.len(), 1);
        assert_eq!(acker.ack_count(), 1);
    }

    #[tokio::test]
    async fn publish_failure_leaves_batch_unacked_and_pipeline_running() {
        let sink = Arc::new(MockBatchSink::new());
        sink.fail_times(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_publish_loop(rx, sink.clone()));

        let (first, first_acker) = completed(&[1, 2], FlushReason::IdleTimeout);
        let (second, second_acker) = completed(&[3], FlushReason::IdleTimeout);
        tx.send(first).unwrap();
        tx.send(second).unwrap();
        drop(tx);
        handle.await.unwrap();

        // first batch failed to publish: never acked, but the loop kept going
        assert_eq!(sink.published().await.len(), 1);
        assert_eq!(first_acker.ack_count(), 0);
        assert_eq!(second_acker.ack_count(), 1);
    }

    #[tokio::test]
    async fn ack_failure_is_survived() {
        let sink = Arc::new(MockBatchSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_publish_loop(rx, sink.clone()));

        let (first, first_acker) = completed(&[1], FlushReason::IdleTimeout);
        first_acker.fail_next();
        let (second, second_acker) = completed(&[2], FlushReason::IdleTimeout);
        tx.send(first).unwrap();
        tx.send(second).unwrap();
        drop(tx);
        handle.await.unwrap();

        // both publishes happened; only the second ack landed
        assert_eq!(sink.published().await.len(), 2);
        assert_eq!(first_acker.ack_count(), 0);
        assert_eq!(second_acker.ack_count(), 1);
    }

    #[tokio::test]
    async fn published_payload_is_a_decodable_archive() {
        let sink = Arc::new(MockBatchSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_publish_loop(rx, sink.clone()));

        let (batch, _) = completed(&[7, 8], FlushReason::Size);
        tx.send(batch).unwrap();
        drop(tx);
        handle.await.unwrap();

        let published = sink.published().await;
        let mut zip =
            zip::ZipArchive::new(std::io::Cursor::new(published[0].to_vec())).unwrap();
        assert_eq!(zip.len(), 2);
        let mut body = Vec::new();
        zip.by_index(0).unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"payload-7");
    }
}
