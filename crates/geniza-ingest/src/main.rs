//! geniza live firehose probe.
//!
//! Connects to an AT Protocol relay, follows the commit event stream, and
//! prints one JSON line per newly created post detected in the target
//! language. Diagnostics go to stderr so stdout stays clean JSONL.
//!
//! # Usage
//!
//! ```bash
//! # Follow the live tail of the default relay, emitting Hebrew posts
//! geniza-ingest
//!
//! # Resume from a cursor against a different relay
//! GENIZA_RELAY_ENDPOINT=wss://relay.example.com geniza-ingest --cursor 987654321
//!
//! # A different target language, more workers
//! geniza-ingest --language fr --workers 16
//! ```
//!
//! Any unrecoverable condition (bad endpoint, failed connect, stream
//! termination) exits nonzero after the workers drain; restarting is an
//! external supervisor's job.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use geniza_core::metrics::{init_metrics, start_metrics_server};
use geniza_core::{Emitter, LanguageFilter, Pipeline};
use geniza_ingest::firehose::{Subscription, SubscriptionConfig};
use geniza_ingest::scheduler::{Scheduler, SchedulerConfig};
use lingua::{IsoCode639_1, Language};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// geniza live firehose probe.
#[derive(Parser, Debug)]
#[command(name = "geniza-ingest")]
#[command(about = "Language-filtered AT Protocol firehose probe")]
#[command(version)]
struct Args {
    /// Sequence cursor to resume the stream from (0 = live tail)
    #[arg(long, default_value = "0")]
    cursor: u64,

    /// Relay endpoint to subscribe to
    #[arg(
        long,
        env = "GENIZA_RELAY_ENDPOINT",
        default_value = "wss://bsky.network"
    )]
    endpoint: String,

    /// ISO 639-1 code of the language to accept
    #[arg(long, default_value = "he")]
    language: String,

    /// Number of parallel pipeline workers
    #[arg(long, default_value = "8")]
    workers: usize,

    /// Bounded queue depth per worker
    #[arg(long, default_value = "100")]
    queue_depth: usize,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required when both ring and aws-lc-rs
    // are present)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing on stderr; stdout carries only output records
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("geniza_ingest=debug".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let target = parse_language(&args.language)?;

    tracing::info!("geniza firehose probe starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
    }

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    tracing::info!("Configuration:");
    tracing::info!("  Endpoint: {}", args.endpoint);
    tracing::info!("  Cursor: {}", args.cursor);
    tracing::info!("  Language: {:?}", target);
    tracing::info!("  Workers: {}", args.workers);
    tracing::info!("  Queue depth: {}", args.queue_depth);

    // The detector is expensive to build and read-only afterwards; build it
    // once and share it across every worker.
    tracing::info!("Building language detector...");
    let pipeline = Arc::new(Pipeline::new(
        LanguageFilter::new(target),
        Emitter::stdout(),
    ));

    let scheduler = Scheduler::spawn(
        SchedulerConfig {
            workers: args.workers,
            queue_depth: args.queue_depth,
        },
        pipeline,
    );

    let subscription = Subscription::new(&SubscriptionConfig {
        endpoint: args.endpoint.clone(),
        cursor: args.cursor,
    })
    .context("invalid relay endpoint")?;

    let result = subscription.run(&scheduler, &running).await;

    // Let in-flight workers finish their current events before exiting.
    tracing::info!("Draining workers...");
    let emitted = scheduler.shutdown().await;
    tracing::info!("Posts emitted: {}", emitted);

    match result {
        Ok(commits) => {
            tracing::info!("Commits handled: {}", commits);
            Ok(())
        }
        Err(e) => Err(e).context("repo subscription errored"),
    }
}

/// Resolve an ISO 639-1 code to a detector language.
fn parse_language(code: &str) -> Result<Language> {
    let code = code.trim();
    let iso = IsoCode639_1::from_str(&code.to_lowercase())
        .or_else(|_| IsoCode639_1::from_str(&code.to_uppercase()))
        .map_err(|_| anyhow!("unrecognized ISO 639-1 language code {code:?}"))?;
    Ok(Language::from_iso_code_639_1(&iso))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_codes() {
        assert_eq!(parse_language("he").unwrap(), Language::Hebrew);
        assert_eq!(parse_language("HE").unwrap(), Language::Hebrew);
        assert_eq!(parse_language(" en ").unwrap(), Language::English);
        assert!(parse_language("zz").is_err());
        assert!(parse_language("").is_err());
    }
}
