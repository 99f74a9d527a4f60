//! Batch accumulation engine.
//!
//! An event loop racing two wait conditions: the next inbound message and the
//! idle deadline. A batch flushes for exactly one of two reasons — it reached
//! the size bound, or the idle timeout elapsed since its most recent member
//! arrived. Empty idle windows never flush.

use collector_core::prelude::*;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info};

/// Run the accumulator until the inbound queue closes or the downstream
/// channel is dropped.
///
/// Message arrival order is preserved into batch membership order, and batch
/// emission order equals accumulation completion order. A partially filled
/// buffer at shutdown is dropped unacknowledged; the broker redelivers its
/// messages after ack-wait.
pub async fn run(
    mut inbound: mpsc::Receiver<InboundMessage>,
    completed: mpsc::UnboundedSender<CompletedBatch>,
    max_messages: usize,
    idle_timeout: Duration,
) {
    let mut buffer = Batch::with_capacity(max_messages);
    let idle = time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            next = inbound.recv() => match next {
                Some(message) => {
                    buffer.push(message);
                    if buffer.len() >= max_messages {
                        info!(count = buffer.len(), "batch full, flushing");
                        if !flush(&mut buffer, FlushReason::Size, &completed) {
                            return;
                        }
                    }
                    // each arrival grants a fresh idle window; after a size
                    // flush this also arms the next cycle's window
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                }
                None => {
                    debug!(pending = buffer.len(), "inbound queue closed, stopping accumulator");
                    return;
                }
            },
            () = &mut idle => {
                if buffer.is_empty() {
                    debug!(idle = ?idle_timeout, "no messages during idle window");
                } else {
                    info!(count = buffer.len(), "idle timeout elapsed, flushing partial batch");
                    if !flush(&mut buffer, FlushReason::IdleTimeout, &completed) {
                        return;
                    }
                }
                idle.as_mut().reset(Instant::now() + idle_timeout);
            }
        }
    }
}

/// Emit the buffer as a completed batch. Returns false when the downstream
/// channel has hung up.
///
/// Callers only flush non-empty buffers; empty idle windows re-arm instead.
fn flush(
    buffer: &mut Batch,
    reason: FlushReason,
    completed: &mpsc::UnboundedSender<CompletedBatch>,
) -> bool {
    debug_assert!(!buffer.is_empty(), "flush called with an empty buffer");
    let acker = match buffer.last() {
        Some(last) => last.acker(),
        None => return true,
    };
    let batch = buffer.take();
    completed
        .send(CompletedBatch {
            batch,
            acker,
            reason,
        })
        .is_ok()
}
