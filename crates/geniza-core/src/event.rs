//! Stream frame and commit event types.
//!
//! Every subscription message is a binary WebSocket frame holding two
//! concatenated DAG-CBOR values: a small header naming the message kind,
//! then the body. Commit bodies carry the repo identifier, sequencing
//! metadata, the ordered operations, and a CAR payload with every block
//! needed to resolve them.

use crate::{Error, Result};
use ipld_core::cid::Cid;
use serde::{Deserialize, Serialize};

/// Frame header preceding every stream message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHeader {
    /// 1 for regular messages, -1 for error frames.
    pub op: i64,
    /// Message kind, e.g. `#commit`. Absent on error frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Body of an error frame (`op == -1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrameBody {
    /// Machine-readable error code.
    pub error: String,
    /// Optional human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Action kind tag carried on a repo operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    /// A new record was created.
    Create,
    /// An existing record was replaced.
    Update,
    /// A record was removed.
    Delete,
    /// An action tag this consumer does not know; skipped, never an error.
    #[serde(other)]
    Unknown,
}

impl OpAction {
    /// Wire tag for this action (for logs and metric labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            OpAction::Create => "create",
            OpAction::Update => "update",
            OpAction::Delete => "delete",
            OpAction::Unknown => "unknown",
        }
    }
}

/// One repository mutation within a commit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOp {
    /// What happened to the record.
    pub action: OpAction,
    /// Record path, `collection/rkey`.
    pub path: String,
    /// CID the commit asserts for the record block; null on deletions.
    #[serde(default)]
    pub cid: Option<Cid>,
}

/// One commit event from the subscription stream.
///
/// Consumed entirely within one pipeline pass and then discarded; nothing
/// here is retained between events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEvent {
    /// Monotonic sequence number on the relay's stream.
    pub seq: i64,
    /// Legacy rebase flag.
    #[serde(default)]
    pub rebase: bool,
    /// Set when the event's content was too large to ship inline.
    #[serde(default)]
    pub too_big: bool,
    /// Repository (account) identifier.
    pub repo: String,
    /// CID of the commit block inside `blocks`.
    pub commit: Cid,
    /// Revision of the repository after this commit.
    pub rev: String,
    /// Revision this commit builds on, when known.
    #[serde(default)]
    pub since: Option<String>,
    /// CARv1 payload with the blocks reachable from the commit.
    #[serde(with = "serde_bytes")]
    pub blocks: Vec<u8>,
    /// Ordered mutations in this commit.
    pub ops: Vec<RepoOp>,
    /// Wall-clock time the relay stamped on the event.
    pub time: String,
}

/// A decoded stream frame.
#[derive(Debug)]
pub enum Frame {
    /// A commit event, ready for the pipeline.
    Commit(Box<CommitEvent>),
    /// Any other message kind (`#identity`, `#account`, `#info`, ...).
    Other(String),
}

/// Split a binary stream message into its header and body.
///
/// Error frames become [`Error::ErrorFrame`]; the subscription treats those
/// as fatal. Unknown message kinds decode to [`Frame::Other`] so callers can
/// count and skip them.
pub fn parse_frame(bytes: &[u8]) -> Result<Frame> {
    // The two values are concatenated with no length prefix, so the header's
    // extent has to come from the CBOR structure itself.
    let header_len = cbor_item_len(bytes)?;
    let (header_bytes, body_bytes) = bytes.split_at(header_len);
    let header: FrameHeader = serde_ipld_dagcbor::from_slice(header_bytes)
        .map_err(|e| Error::Frame(format!("header: {e}")))?;

    if header.op < 0 {
        let body: ErrorFrameBody = serde_ipld_dagcbor::from_slice(body_bytes)
            .map_err(|e| Error::Frame(format!("error body: {e}")))?;
        return Err(Error::ErrorFrame {
            error: body.error,
            message: body.message.unwrap_or_default(),
        });
    }

    match header.t.as_deref() {
        Some("#commit") => {
            let body: CommitEvent = serde_ipld_dagcbor::from_slice(body_bytes)
                .map_err(|e| Error::Frame(format!("commit body: {e}")))?;
            Ok(Frame::Commit(Box::new(body)))
        }
        Some(kind) => Ok(Frame::Other(kind.to_string())),
        None => Err(Error::Frame("message frame has no kind".to_string())),
    }
}

/// Byte length of the first CBOR item in `bytes`.
///
/// DAG-CBOR only allows definite lengths, so one structural walk suffices;
/// indefinite-length markers are rejected.
fn cbor_item_len(bytes: &[u8]) -> Result<usize> {
    skip_item(bytes, 0, 0)
}

/// Nesting depth past which a frame header is treated as hostile.
const MAX_CBOR_DEPTH: u32 = 128;

/// Position just past the item starting at `pos`.
fn skip_item(bytes: &[u8], pos: usize, depth: u32) -> Result<usize> {
    if depth > MAX_CBOR_DEPTH {
        return Err(Error::Frame("frame header nests too deeply".to_string()));
    }
    let initial = *bytes
        .get(pos)
        .ok_or_else(|| Error::Frame("truncated frame header".to_string()))?;
    let major = initial >> 5;
    let (arg, mut pos) = read_arg(bytes, pos + 1, initial & 0x1f)?;
    match major {
        // Unsigned/negative ints, simple values, floats: fully consumed.
        0 | 1 | 7 => Ok(pos),
        // Byte and text strings carry `arg` payload bytes.
        2 | 3 => {
            let end = pos
                .checked_add(usize::try_from(arg).map_err(|_| oversized())?)
                .ok_or_else(oversized)?;
            if end > bytes.len() {
                return Err(Error::Frame("truncated frame header".to_string()));
            }
            Ok(end)
        }
        // Arrays hold `arg` items, maps `arg` key-value pairs.
        4 | 5 => {
            let count = arg
                .checked_mul(if major == 5 { 2 } else { 1 })
                .ok_or_else(oversized)?;
            for _ in 0..count {
                pos = skip_item(bytes, pos, depth + 1)?;
            }
            Ok(pos)
        }
        // Tags wrap exactly one item.
        6 => skip_item(bytes, pos, depth + 1),
        _ => unreachable!("three-bit major type"),
    }
}

/// Decode the argument following an initial byte.
fn read_arg(bytes: &[u8], pos: usize, info: u8) -> Result<(u64, usize)> {
    let width = match info {
        0..=23 => return Ok((u64::from(info), pos)),
        24 => 1,
        25 => 2,
        26 => 4,
        27 => 8,
        _ => {
            return Err(Error::Frame(
                "indefinite-length item in frame header".to_string(),
            ));
        }
    };
    let end = pos + width;
    let slice = bytes
        .get(pos..end)
        .ok_or_else(|| Error::Frame("truncated frame header".to_string()))?;
    let mut arg = 0u64;
    for byte in slice {
        arg = (arg << 8) | u64::from(*byte);
    }
    Ok((arg, end))
}

fn oversized() -> Error {
    Error::Frame("frame header length overflow".to_string())
}
