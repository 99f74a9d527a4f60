//! Collector CLI

use anyhow::Context;
use clap::Parser;
use collector::Collector;
use collector_core::prelude::*;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Batches messages from a NATS subject into archived batches on another")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "COLLECTOR_CONFIG")]
    config: Option<String>,

    /// NATS server URL
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// Inbound subject to consume from
    #[arg(long, env = "NATS_INCOMING_SUBJECT_NAME")]
    inbound_subject: Option<String>,

    /// Outbound subject to publish archives to
    #[arg(long, env = "NATS_OUTGOING_SUBJECT_NAME")]
    outbound_subject: Option<String>,

    /// Maximum messages per batch
    #[arg(long, env = "MSG_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Idle timeout before a partial batch flushes (e.g. "9s")
    #[arg(long, env = "MSG_BATCH_TIMEOUT", value_parser = humantime::parse_duration)]
    idle_timeout: Option<Duration>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting collector");

    let mut config = CollectorConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(url) = args.nats_url {
        config.nats.url = url;
    }
    if let Some(subject) = args.inbound_subject {
        config.inbound.subject = subject;
    }
    if let Some(subject) = args.outbound_subject {
        config.outbound.subject = subject;
    }
    if let Some(size) = args.batch_size {
        config.batching.max_messages = size;
    }
    if let Some(timeout) = args.idle_timeout {
        config.batching.idle_timeout = timeout;
    }

    info!(
        url = %config.nats.url,
        inbound = %config.inbound.subject,
        outbound = %config.outbound.subject,
        batch_size = config.batching.max_messages,
        idle_timeout = ?config.batching.idle_timeout,
        "loaded configuration"
    );

    Collector::new(config).run().await?;
    Ok(())
}
