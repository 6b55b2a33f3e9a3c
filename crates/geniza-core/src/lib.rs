//! Core extraction and filtering pipeline for the geniza firehose probe.
//!
//! This crate turns raw commit events from an AT Protocol relay stream into
//! line-delimited JSON records for posts written in a target language. It
//! provides:
//! - Stream frame and commit event decoding (DAG-CBOR)
//! - CAR block bundle indexing and record resolution via the commit's
//!   Merkle Search Tree
//! - Record integrity verification against the operation's asserted CID
//! - The content filter gates (action, collection, reply, language)
//! - The JSONL output emitter and Prometheus metrics helpers
//!
//! Everything here is synchronous and free of network I/O: the stream
//! driver in `geniza-ingest` owns the connection and hands each event to
//! [`Pipeline::handle_commit`] exactly once.

pub mod blocks;
mod error;
pub mod event;
pub mod filter;
pub mod lang;
pub mod metrics;
pub mod output;
pub mod path;
pub mod record;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod testing;

pub use blocks::{BlockMap, SignedCommit, compute_cid};
pub use error::{Error, Result};
pub use event::{CommitEvent, Frame, FrameHeader, OpAction, RepoOp, parse_frame};
pub use filter::{POST_COLLECTION, Pipeline, verify_record_cid};
pub use lang::{LanguageFilter, contains_hebrew_letters};
pub use output::{Emitter, OutputRecord};
pub use path::{Nsid, RecordKey, RecordPath};
pub use record::{Record, decode_record};
