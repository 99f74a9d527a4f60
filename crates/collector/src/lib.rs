//! # Collector
//!
//! NATS JetStream batch collector service.
//!
//! Data flow: broker → ingestion adapter → bounded queue → batch accumulator
//! → completed-batch channel → publish-and-ack loop → broker. Batches flush
//! on a size bound or an idle timeout, whichever comes first, and the
//! originating messages are acknowledged only after the archived batch has
//! been durably republished.

pub mod accumulator;
pub mod ingest;
pub mod publisher;
pub mod reconcile;

use async_nats::jetstream::consumer::{self, push, AckPolicy, Consumer};
use async_nats::jetstream::{self, stream::Stream, Context};
use async_nats::Client;
use collector_core::prelude::*;
use ingest::IngestionAdapter;
use publisher::JetStreamBatchSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The collector service: connects, provisions, reconciles, and runs the
/// pipeline until shutdown.
pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Run the collector. Errors returned here are startup failures; once
    /// the pipeline is running, broker-side failures are logged and survived.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        config.validate()?;

        info!(url = %config.nats.url, name = %config.nats.connection_name, "connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .name(&config.nats.connection_name)
            .connect(&config.nats.url)
            .await
            .map_err(|e| CollectorError::nats_with_source("failed to connect", e))?;
        let context = jetstream::new(client.clone());

        ensure_outbound_stream(&context, &config).await?;

        let stream = context
            .get_stream(&config.inbound.stream)
            .await
            .map_err(|e| CollectorError::nats_with_source("inbound stream not found", e))?;
        let mut consumer = get_or_create_consumer(&client, &stream, &config).await?;

        reconcile::wait_for_pending_acks(&mut consumer).await?;

        let (message_tx, message_rx) = mpsc::channel(config.batching.queue_capacity());
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        let adapter = IngestionAdapter::subscribe(consumer, message_tx).await?;
        let ingest_task = tokio::spawn(adapter.run());
        let accumulator_task = tokio::spawn(accumulator::run(
            message_rx,
            batch_tx,
            config.batching.max_messages,
            config.batching.idle_timeout,
        ));

        let sink = Arc::new(JetStreamBatchSink::new(
            context,
            config.outbound.subject.clone(),
        ));

        info!(
            inbound = %config.inbound.subject,
            outbound = %config.outbound.subject,
            max_messages = config.batching.max_messages,
            idle_timeout = ?config.batching.idle_timeout,
            "collector running"
        );

        tokio::select! {
            () = publisher::run_publish_loop(batch_rx, sink) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
        }

        ingest_task.abort();
        accumulator_task.abort();
        info!("collector stopped");
        Ok(())
    }
}

/// Create the outbound stream if it does not exist yet.
async fn ensure_outbound_stream(context: &Context, config: &CollectorConfig) -> Result<()> {
    let name = &config.outbound.stream;
    match context.get_stream(name).await {
        Ok(_) => {
            debug!(stream = %name, "outbound stream exists");
            Ok(())
        }
        Err(_) => {
            let stream_config = jetstream::stream::Config {
                name: name.clone(),
                subjects: vec![config.outbound.subject.clone()],
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            };
            context
                .create_stream(stream_config)
                .await
                .map_err(|e| CollectorError::nats_with_source("failed to create outbound stream", e))?;
            info!(stream = %name, "created outbound stream");
            Ok(())
        }
    }
}

/// Get the durable push consumer, creating it with cumulative acknowledgment
/// when absent.
///
/// `AckPolicy::All` is what makes acking a batch's last message acknowledge
/// every earlier message in it.
async fn get_or_create_consumer(
    client: &Client,
    stream: &Stream,
    config: &CollectorConfig,
) -> Result<Consumer<push::Config>> {
    if let Some(name) = &config.inbound.durable_name {
        if let Ok(mut existing) = stream.get_consumer::<push::Config>(name).await {
            let info = existing
                .info()
                .await
                .map_err(|e| CollectorError::nats_with_source("failed to fetch consumer info", e))?;
            verify_cumulative_ack(&info.config)?;
            debug!(consumer = %name, "using existing durable consumer");
            return Ok(existing);
        }
    }

    let consumer_config = push::Config {
        durable_name: config.inbound.durable_name.clone(),
        deliver_subject: client.new_inbox(),
        deliver_group: config.inbound.queue_group.clone(),
        filter_subject: config.inbound.subject.clone(),
        ack_policy: AckPolicy::All,
        ack_wait: config.batching.ack_wait().max(Duration::from_secs(1)),
        max_ack_pending: config.batching.max_ack_pending(),
        ..Default::default()
    };

    let consumer = stream
        .create_consumer(consumer_config)
        .await
        .map_err(|e| CollectorError::nats_with_source("failed to create consumer", e))?;

    info!(
        durable = ?config.inbound.durable_name,
        ack_wait = ?config.batching.ack_wait(),
        max_ack_pending = config.batching.max_ack_pending(),
        "created consumer"
    );
    Ok(consumer)
}

/// Acking a batch's last message only acknowledges the whole batch when the
/// consumer uses cumulative acknowledgment; anything else would leave every
/// earlier message pending forever, redelivering indefinitely.
fn verify_cumulative_ack(config: &consumer::Config) -> Result<()> {
    if config.ack_policy != AckPolicy::All {
        return Err(CollectorError::nats(format!(
            "durable consumer has ack policy {:?}, but cumulative (all) is required for \
             per-batch acknowledgment",
            config.ack_policy
        )));
    }
    Ok(())
}
