//! Relay subscription over WebSocket.
//!
//! Owns the connection and the read loop; decoded commit events are handed
//! to the scheduler one at a time. Connection setup failures and stream
//! termination are fatal here — restart and backoff policy belongs to an
//! external supervisor, not this process.

use crate::scheduler::Scheduler;
use crate::{Error, Result};
use futures_util::StreamExt;
use geniza_core::{Frame, parse_frame};
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// xrpc method for the repo event stream.
const SUBSCRIBE_PATH: &str = "/xrpc/com.atproto.sync.subscribeRepos";

/// Subscription parameters.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Relay endpoint, e.g. `wss://bsky.network`.
    pub endpoint: String,
    /// Sequence cursor to resume from; 0 subscribes at the live tail.
    pub cursor: u64,
}

/// A subscription to a relay's commit event stream.
#[derive(Debug)]
pub struct Subscription {
    url: Url,
}

impl Subscription {
    /// Build the stream URL from the configured endpoint and cursor.
    pub fn new(config: &SubscriptionConfig) -> Result<Self> {
        let mut url = Url::parse(&config.endpoint)?;
        url.set_path(SUBSCRIBE_PATH);
        if config.cursor > 0 {
            url.set_query(Some(&format!("cursor={}", config.cursor)));
        }
        Ok(Self { url })
    }

    /// The resolved subscription URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connect and pump frames into the scheduler until the stream ends or
    /// `running` is cleared.
    ///
    /// Returns the number of commit events dispatched. Any `Err` from here
    /// means the subscription is over for good.
    pub async fn run(&self, scheduler: &Scheduler, running: &AtomicBool) -> Result<u64> {
        tracing::info!(url = %self.url, "subscribing to relay");
        let (mut stream, _response) = connect_async(self.url.as_str()).await?;
        tracing::info!("relay connection established");

        let mut commits = 0u64;
        while running.load(Ordering::SeqCst) {
            let Some(message) = stream.next().await else {
                return Err(Error::Terminated("stream ended".to_string()));
            };
            match message? {
                Message::Binary(payload) => match parse_frame(&payload) {
                    Ok(Frame::Commit(evt)) => {
                        counter!("firehose_frames_total", "kind" => "#commit").increment(1);
                        scheduler.dispatch(*evt).await?;
                        commits += 1;
                    }
                    Ok(Frame::Other(kind)) => {
                        tracing::debug!(kind = %kind, "skipping non-commit frame");
                        counter!("firehose_frames_total", "kind" => "other").increment(1);
                    }
                    Err(e @ geniza_core::Error::ErrorFrame { .. }) => {
                        return Err(Error::Core(e));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "repo subscription skipped invalid message");
                        counter!("firehose_frames_total", "kind" => "invalid").increment(1);
                    }
                },
                Message::Close(frame) => {
                    return Err(Error::Terminated(format!("close frame: {frame:?}")));
                }
                // Pings are answered by the transport on the next read;
                // nothing else carries frames we care about.
                _ => {}
            }
        }

        tracing::info!("shutdown requested, leaving the stream");
        Ok(commits)
    }
}
