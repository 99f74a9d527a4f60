//! Ingestion adapter.
//!
//! The only point where broker deliveries enter the core: wraps the push
//! consumer's message stream and forwards each delivery into the bounded
//! inbound queue. The queue is sized at twice the batch size so bursts are
//! absorbed without stalling the delivery path.

use async_nats::jetstream;
use async_nats::jetstream::consumer::push;
use async_nats::jetstream::consumer::Consumer;
use async_trait::async_trait;
use chrono::DateTime;
use collector_core::prelude::*;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Ack handle backed by a JetStream delivery.
///
/// Uses double-ack so success means the broker has confirmed the
/// acknowledgment, not merely that it was sent.
pub struct JetStreamAcker {
    message: jetstream::Message,
}

impl JetStreamAcker {
    pub fn new(message: jetstream::Message) -> Self {
        Self { message }
    }
}

#[async_trait]
impl Acker for JetStreamAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .double_ack()
            .await
            .map_err(|e| CollectorError::nats_with_source("ack failed", e))
    }
}

/// Forwards broker deliveries into the accumulator's bounded queue.
pub struct IngestionAdapter {
    messages: push::Messages,
    queue: mpsc::Sender<InboundMessage>,
}

impl IngestionAdapter {
    /// Open the consumer's delivery stream. Failure here is a startup error.
    pub async fn subscribe(
        consumer: Consumer<push::Config>,
        queue: mpsc::Sender<InboundMessage>,
    ) -> Result<Self> {
        let messages = consumer
            .messages()
            .await
            .map_err(|e| CollectorError::nats_with_source("failed to subscribe", e))?;
        Ok(Self { messages, queue })
    }

    /// Run until the subscription ends or the accumulator hangs up.
    ///
    /// Stream errors are logged and consumption continues; the broker
    /// redelivers anything that was lost in flight.
    pub async fn run(mut self) {
        let metrics = CollectorMetrics::new("ingest");

        while let Some(next) = self.messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "error on subscription stream");
                    continue;
                }
            };

            let inbound = into_inbound(message);
            metrics.record_message_received();

            if self.queue.send(inbound).await.is_err() {
                debug!("accumulator stopped, ending ingestion");
                return;
            }
        }
        debug!("subscription stream ended");
    }
}

/// Wrap a JetStream delivery, pulling sequence and timestamp out of its
/// metadata. Malformed metadata degrades to a placeholder rather than
/// dropping the message.
fn into_inbound(message: jetstream::Message) -> InboundMessage {
    let (stream_sequence, published) = match message.info() {
        Ok(info) => (
            info.stream_sequence,
            Some(DateTime::from_timestamp_nanos(
                info.published.unix_timestamp_nanos() as i64,
            )),
        ),
        Err(e) => {
            warn!(error = %e, "delivery carries no JetStream metadata");
            (0, None)
        }
    };

    let payload = message.payload.clone();
    InboundMessage::new(
        payload,
        stream_sequence,
        published,
        Arc::new(JetStreamAcker::new(message)),
    )
}
