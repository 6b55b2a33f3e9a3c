//! Domain policy: which operations become output records.
//!
//! One commit event is processed start to finish by a single worker. Every
//! operation runs through the gates in a fixed, cheapest-first order:
//! action, collection, record integrity, reply, language. Integrity and
//! block-resolution failures stop the remaining operations of the event;
//! everything else skips only the operation at hand.

use crate::blocks::BlockMap;
use crate::event::{CommitEvent, OpAction, RepoOp};
use crate::lang::LanguageFilter;
use crate::output::{Emitter, OutputRecord};
use crate::path::RecordPath;
use crate::record::decode_record;
use crate::{Error, Result};
use ipld_core::cid::Cid;
use metrics::counter;
use std::io::Write;

/// Collection whose created records are candidate posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Full binary comparison between the CID asserted on the operation and the
/// CID computed from the resolved record bytes. A create operation with no
/// asserted CID counts as a mismatch.
pub fn verify_record_cid(op: &RepoOp, computed: &Cid) -> Result<()> {
    match op.cid {
        Some(asserted) if asserted == *computed => Ok(()),
        Some(asserted) => Err(Error::CidMismatch {
            asserted: asserted.to_string(),
            computed: computed.to_string(),
        }),
        None => Err(Error::CidMismatch {
            asserted: "missing".to_string(),
            computed: computed.to_string(),
        }),
    }
}

/// Per-event extraction and filtering pipeline.
///
/// Holds no per-event state; one instance is shared read-only by all
/// workers.
pub struct Pipeline<W> {
    lang: LanguageFilter,
    emitter: Emitter<W>,
}

impl<W: Write> Pipeline<W> {
    /// Assemble a pipeline around a language gate and an output sink.
    pub fn new(lang: LanguageFilter, emitter: Emitter<W>) -> Self {
        Self { lang, emitter }
    }

    /// Process one commit event, returning how many posts were emitted.
    ///
    /// Event-level problems (oversized flag, unreadable block bundle) skip
    /// the event with a diagnostic and return `Ok(0)`; only emitter write
    /// failures surface as errors.
    pub fn handle_commit(&self, evt: &CommitEvent) -> Result<u64> {
        counter!("firehose_commits_total").increment(1);

        if evt.too_big {
            tracing::warn!(seq = evt.seq, repo = %evt.repo, "skipping event flagged too big");
            counter!("firehose_events_skipped_total", "reason" => "too_big").increment(1);
            return Ok(0);
        }

        let bundle = match BlockMap::from_car(&evt.blocks) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::error!(seq = evt.seq, repo = %evt.repo, error = %e, "failed to index event block bundle");
                counter!("firehose_events_skipped_total", "reason" => "bad_car").increment(1);
                return Ok(0);
            }
        };

        let mut emitted = 0u64;
        for op in &evt.ops {
            let path = match RecordPath::parse(&op.path) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(seq = evt.seq, action = op.action.as_str(), path = %op.path, error = %e, "invalid path in repo op");
                    counter!("firehose_ops_skipped_total", "reason" => "malformed_path")
                        .increment(1);
                    continue;
                }
            };
            counter!(
                "firehose_operations",
                "action" => op.action.as_str(),
                "collection" => path.collection.to_string()
            )
            .increment(1);

            if op.action != OpAction::Create {
                continue;
            }
            if path.collection.as_str() != POST_COLLECTION {
                continue;
            }

            // From here on the commit's own data is in question; a bundle
            // that cannot produce this record will not produce the rest.
            let (computed, record_bytes) = match bundle.resolve_record(&op.path) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::error!(seq = evt.seq, repo = %evt.repo, path = %op.path, error = %e, "reading record from event blocks");
                    counter!("firehose_events_aborted_total", "reason" => "resolve").increment(1);
                    break;
                }
            };
            if let Err(e) = verify_record_cid(op, &computed) {
                tracing::error!(seq = evt.seq, repo = %evt.repo, path = %op.path, error = %e, "mismatch between commit op CID and record block");
                counter!("firehose_events_aborted_total", "reason" => "cid_mismatch").increment(1);
                break;
            }

            let record = match decode_record(record_bytes) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(seq = evt.seq, path = %op.path, error = %e, "failed to parse record CBOR");
                    counter!("firehose_ops_skipped_total", "reason" => "bad_record").increment(1);
                    continue;
                }
            };

            if record.has_populated("reply") {
                counter!("firehose_ops_skipped_total", "reason" => "reply").increment(1);
                continue;
            }

            let Some(text) = record.str_field("text") else {
                // The post collection schema guarantees a string `text`; a
                // record that got this far without one is a producer bug.
                let err = Error::InvariantViolation(format!(
                    "post record {} has no text string",
                    op.path
                ));
                tracing::error!(seq = evt.seq, repo = %evt.repo, path = %op.path, error = %err, "skipping record that violates the post schema");
                counter!("firehose_ops_skipped_total", "reason" => "schema").increment(1);
                continue;
            };

            let detected = self.lang.detect(text);
            tracing::debug!(rkey = %path.rkey, language = ?detected, "language detected");
            if detected != Some(self.lang.target()) {
                counter!("firehose_ops_skipped_total", "reason" => "language").increment(1);
                continue;
            }

            self.emitter.emit(&OutputRecord {
                seq: evt.seq,
                rev: evt.rev.clone(),
                time: evt.time.clone(),
                rkey: path.rkey.to_string(),
                cid: computed.to_string(),
                text: text.to_string(),
            })?;
            counter!("posts_matched_total").increment(1);
            emitted += 1;
        }

        Ok(emitted)
    }
}
