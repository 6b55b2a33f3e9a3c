//! Stream driver for the geniza firehose probe.
//!
//! This crate owns everything around the core pipeline: the WebSocket
//! subscription to the relay, the partitioned worker pool that preserves
//! per-repository event order, and the daemon binary's configuration
//! surface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ Subscription │ ──► │ Scheduler         │ ──► │ geniza-core      │
//! │ (WebSocket)  │     │ (partitioned pool)│     │ Pipeline → JSONL │
//! └──────────────┘     └───────────────────┘     └──────────────────┘
//! ```
//!
//! The subscription decodes frames and dispatches commit events; each worker
//! runs the core pipeline on one event at a time and writes matched posts to
//! stdout. Diagnostics go to stderr, metrics to the Prometheus endpoint.

pub mod error;
pub mod firehose;
pub mod scheduler;

pub use error::{Error, Result};
pub use firehose::{Subscription, SubscriptionConfig};
pub use scheduler::{Scheduler, SchedulerConfig};
