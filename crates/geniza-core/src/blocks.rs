//! Content-addressed block bundles shipped with commit events.
//!
//! A commit's `blocks` payload is a CARv1 archive: a varint-framed DAG-CBOR
//! header naming the root commit, followed by varint-framed sections of
//! `CID || block bytes`. Records are not addressed directly by path; the
//! commit points at a Merkle Search Tree whose nodes map prefix-compressed
//! keys to record blocks, and resolution walks that tree.
//!
//! Everything here is scoped to a single event. Any failure (missing block,
//! corrupt node, absent path) is a local [`Error::BlockResolution`], never a
//! protocol violation.

use crate::{Error, Result};
use ipld_core::cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Cursor;

/// Multicodec code for DAG-CBOR payloads.
const DAG_CBOR: u64 = 0x71;

/// Upper bound on one CAR section, matching the relay's framing limit.
const MAX_SECTION_SIZE: u64 = 2 * 1024 * 1024;

/// CARv1 archive header.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CarHeader {
    pub(crate) version: u64,
    pub(crate) roots: Vec<Cid>,
}

/// Signed commit object at the root of an event's block bundle.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedCommit {
    /// Repository (account) identifier.
    pub did: String,
    /// Repository format version.
    pub version: u64,
    /// Root node of the record tree.
    pub data: Cid,
    /// Revision of this commit.
    pub rev: String,
    /// Previous commit, when present.
    #[serde(default)]
    pub prev: Option<Cid>,
    /// Signature over the commit; not verified here.
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

/// One tree node: an optional left subtree plus ordered entries whose keys
/// share prefixes with their predecessor.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MstNode {
    #[serde(default)]
    pub(crate) l: Option<Cid>,
    pub(crate) e: Vec<MstEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MstEntry {
    /// Bytes shared with the previous entry's key.
    pub(crate) p: u64,
    /// Remainder of the key after the shared prefix.
    #[serde(with = "serde_bytes")]
    pub(crate) k: Vec<u8>,
    /// Record block for this key.
    pub(crate) v: Cid,
    /// Subtree holding keys greater than this entry's.
    #[serde(default)]
    pub(crate) t: Option<Cid>,
}

/// The content-addressed blocks of one commit event, keyed by CID.
#[derive(Debug)]
pub struct BlockMap {
    root: Cid,
    blocks: HashMap<Cid, Vec<u8>>,
}

impl BlockMap {
    /// Index a CARv1 payload. The header's first root names the commit
    /// block; sections after it are stored verbatim under their CID.
    pub fn from_car(bytes: &[u8]) -> Result<Self> {
        let (header_bytes, mut rest) = next_section(bytes)?;
        let header: CarHeader = serde_ipld_dagcbor::from_slice(header_bytes)
            .map_err(|e| Error::BlockResolution(format!("CAR header: {e}")))?;
        if header.version != 1 {
            return Err(Error::BlockResolution(format!(
                "unsupported CAR version {}",
                header.version
            )));
        }
        let root = header
            .roots
            .first()
            .copied()
            .ok_or_else(|| Error::BlockResolution("CAR header has no roots".to_string()))?;

        let mut blocks = HashMap::new();
        while !rest.is_empty() {
            let (section, remainder) = next_section(rest)?;
            let mut cursor = Cursor::new(section);
            let cid = Cid::read_bytes(&mut cursor)
                .map_err(|e| Error::BlockResolution(format!("block CID: {e}")))?;
            blocks.insert(cid, section[cursor.position() as usize..].to_vec());
            rest = remainder;
        }

        Ok(Self { root, blocks })
    }

    /// Raw bytes of one block, if present in the bundle.
    pub fn get(&self, cid: &Cid) -> Option<&[u8]> {
        self.blocks.get(cid).map(Vec::as_slice)
    }

    /// Number of blocks in the bundle.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the bundle holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Decode the signed commit at the bundle root.
    pub fn commit(&self) -> Result<SignedCommit> {
        self.decode_block(&self.root)
    }

    /// Resolve a record path to its canonical bytes plus the CID computed
    /// over those bytes.
    pub fn resolve_record(&self, path: &str) -> Result<(Cid, &[u8])> {
        let commit = self.commit()?;
        let value = self
            .search(&commit.data, path.as_bytes())?
            .ok_or_else(|| {
                Error::BlockResolution(format!("record {path:?} not present in block bundle"))
            })?;
        let bytes = self.get(&value).ok_or_else(|| {
            Error::BlockResolution(format!("record block {value} missing from bundle"))
        })?;
        Ok((compute_cid(bytes), bytes))
    }

    fn decode_block<T: serde::de::DeserializeOwned>(&self, cid: &Cid) -> Result<T> {
        let bytes = self.get(cid).ok_or_else(|| {
            Error::BlockResolution(format!("block {cid} not reachable from bundle root"))
        })?;
        serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|e| Error::BlockResolution(format!("block {cid} is corrupt: {e}")))
    }

    /// Walk the tree from `node` looking for `key`, rebuilding full keys
    /// from the shared-prefix encoding as entries are visited in order.
    fn search(&self, node: &Cid, key: &[u8]) -> Result<Option<Cid>> {
        let node: MstNode = self.decode_block(node)?;
        let mut prev_key: Vec<u8> = Vec::new();
        let mut lower = node.l;
        for entry in &node.e {
            let shared = entry.p as usize;
            if shared > prev_key.len() {
                return Err(Error::BlockResolution(format!(
                    "entry shares {shared} bytes but previous key holds {}",
                    prev_key.len()
                )));
            }
            let mut full = Vec::with_capacity(shared + entry.k.len());
            full.extend_from_slice(&prev_key[..shared]);
            full.extend_from_slice(&entry.k);
            match key.cmp(full.as_slice()) {
                Ordering::Equal => return Ok(Some(entry.v)),
                Ordering::Less => {
                    return match lower {
                        Some(ref subtree) => self.search(subtree, key),
                        None => Ok(None),
                    };
                }
                Ordering::Greater => {
                    prev_key = full;
                    lower = entry.t;
                }
            }
        }
        match lower {
            Some(ref subtree) => self.search(subtree, key),
            None => Ok(None),
        }
    }
}

/// Split the next varint-framed section off the front of `input`.
fn next_section(input: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = unsigned_varint::decode::u64(input)
        .map_err(|e| Error::BlockResolution(format!("section length: {e}")))?;
    if len > MAX_SECTION_SIZE {
        return Err(Error::BlockResolution(format!(
            "section of {len} bytes exceeds the block size limit"
        )));
    }
    if rest.len() < len as usize {
        return Err(Error::BlockResolution("truncated CAR section".to_string()));
    }
    Ok(rest.split_at(len as usize))
}

/// CID of a DAG-CBOR block: CIDv1, SHA-256 digest.
pub fn compute_cid(bytes: &[u8]) -> Cid {
    Cid::new_v1(DAG_CBOR, Code::Sha2_256.digest(bytes))
}
