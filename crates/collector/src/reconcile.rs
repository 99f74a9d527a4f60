//! Startup reconciliation.
//!
//! After a restart, messages acknowledged-but-unconfirmed by a prior run may
//! still be pending on the durable consumer. Waiting out the consumer's
//! ack-wait before subscribing lets those redeliveries resolve instead of
//! overlapping with fresh consumption.

use async_nats::jetstream::consumer::{push, Consumer};
use collector_core::prelude::*;
use tracing::info;

/// Block until pending acks from a previous run have expired.
///
/// Reads the pending count and ack-wait from the consumer's own metadata; a
/// clean consumer proceeds immediately.
pub async fn wait_for_pending_acks(consumer: &mut Consumer<push::Config>) -> Result<()> {
    let info = consumer
        .info()
        .await
        .map_err(|e| CollectorError::nats_with_source("failed to fetch consumer info", e))?;

    let pending = info.num_ack_pending;
    let ack_wait = info.config.ack_wait;

    if pending > 0 {
        info!(
            pending,
            ack_wait = ?ack_wait,
            "pending acks from a previous run, waiting for them to expire"
        );
        tokio::time::sleep(ack_wait).await;
        info!("wait over, starting to process messages");
    }

    Ok(())
}
