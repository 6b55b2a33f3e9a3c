//! Builders for synthetic commit events.
//!
//! These construct real CAR payloads (commit block, tree node, record
//! blocks) with the same encoders the pipeline decodes with, so tests can
//! drive the full path from frame bytes to output lines. Available to
//! dependent crates' tests through the `test-fixtures` feature.

use crate::blocks::{CarHeader, MstEntry, MstNode, SignedCommit, compute_cid};
use crate::event::{CommitEvent, OpAction, RepoOp};
use ipld_core::cid::Cid;
use serde::Serialize;

/// Repository identifier used by every fixture.
pub const TEST_REPO: &str = "did:plc:w4es6sfh43zalhsa36eyndmc";

/// A single-record CAR payload plus the CIDs of its interesting blocks.
pub struct CarFixture {
    /// CID of the record block.
    pub record_cid: Cid,
    /// CID of the commit block (the CAR root).
    pub commit_cid: Cid,
    /// The CARv1 bytes.
    pub car: Vec<u8>,
}

/// A two-record CAR payload exercising key prefix compression.
pub struct TwoRecordCarFixture {
    /// CID of the first record block.
    pub first_cid: Cid,
    /// CID of the second record block.
    pub second_cid: Cid,
    /// The CARv1 bytes.
    pub car: Vec<u8>,
}

#[derive(Serialize)]
struct TestPost<'a> {
    #[serde(rename = "$type")]
    kind: &'a str,
    text: &'a str,
    #[serde(rename = "createdAt")]
    created_at: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<TestReply<'a>>,
}

#[derive(Serialize)]
struct TestReply<'a> {
    root: &'a str,
    parent: &'a str,
}

/// DAG-CBOR bytes of a minimal post record.
pub fn post_bytes(text: &str, reply: bool) -> Vec<u8> {
    let record = TestPost {
        kind: "app.bsky.feed.post",
        text,
        created_at: "2026-08-07T12:00:00.000Z",
        reply: reply.then_some(TestReply {
            root: "at://did:plc:other/app.bsky.feed.post/3kroot",
            parent: "at://did:plc:other/app.bsky.feed.post/3kparent",
        }),
    };
    serde_ipld_dagcbor::to_vec(&record).expect("encode test post")
}

/// DAG-CBOR bytes of a record with no `text` field at all.
pub fn textless_bytes() -> Vec<u8> {
    #[derive(Serialize)]
    struct Textless<'a> {
        #[serde(rename = "$type")]
        kind: &'a str,
        #[serde(rename = "createdAt")]
        created_at: &'a str,
    }
    serde_ipld_dagcbor::to_vec(&Textless {
        kind: "app.bsky.feed.post",
        created_at: "2026-08-07T12:00:00.000Z",
    })
    .expect("encode textless record")
}

fn encode_block<T: Serialize>(value: &T) -> (Cid, Vec<u8>) {
    let bytes = serde_ipld_dagcbor::to_vec(value).expect("encode test block");
    (compute_cid(&bytes), bytes)
}

fn commit_for(data: Cid) -> SignedCommit {
    SignedCommit {
        did: TEST_REPO.to_string(),
        version: 3,
        data,
        rev: "3lcrexample2c".to_string(),
        prev: None,
        sig: vec![0u8; 64],
    }
}

/// CAR bundle holding one record reachable at `path`.
pub fn single_record_car(path: &str, record: Vec<u8>) -> CarFixture {
    let record_cid = compute_cid(&record);
    let node = MstNode {
        l: None,
        e: vec![MstEntry {
            p: 0,
            k: path.as_bytes().to_vec(),
            v: record_cid,
            t: None,
        }],
    };
    let (node_cid, node_bytes) = encode_block(&node);
    let (commit_cid, commit_bytes) = encode_block(&commit_for(node_cid));
    let car = build_car(
        commit_cid,
        &[
            (commit_cid, commit_bytes),
            (node_cid, node_bytes),
            (record_cid, record),
        ],
    );
    CarFixture {
        record_cid,
        commit_cid,
        car,
    }
}

/// CAR bundle holding two records in one tree node, the second key encoded
/// relative to the first. `first_path` must sort before `second_path`.
pub fn two_record_car(
    first_path: &str,
    first_record: Vec<u8>,
    second_path: &str,
    second_record: Vec<u8>,
) -> TwoRecordCarFixture {
    let k1 = first_path.as_bytes();
    let k2 = second_path.as_bytes();
    assert!(k1 < k2, "tree entries must be key-ordered");
    let shared = k1.iter().zip(k2).take_while(|(a, b)| a == b).count();

    let first_cid = compute_cid(&first_record);
    let second_cid = compute_cid(&second_record);
    let node = MstNode {
        l: None,
        e: vec![
            MstEntry {
                p: 0,
                k: k1.to_vec(),
                v: first_cid,
                t: None,
            },
            MstEntry {
                p: shared as u64,
                k: k2[shared..].to_vec(),
                v: second_cid,
                t: None,
            },
        ],
    };
    let (node_cid, node_bytes) = encode_block(&node);
    let (commit_cid, commit_bytes) = encode_block(&commit_for(node_cid));
    let car = build_car(
        commit_cid,
        &[
            (commit_cid, commit_bytes),
            (node_cid, node_bytes),
            (first_cid, first_record),
            (second_cid, second_record),
        ],
    );
    TwoRecordCarFixture {
        first_cid,
        second_cid,
        car,
    }
}

/// Assemble CARv1 bytes from a root and pre-encoded blocks.
pub fn build_car(root: Cid, blocks: &[(Cid, Vec<u8>)]) -> Vec<u8> {
    build_car_with_version(1, root, blocks)
}

/// Like [`build_car`] but with an arbitrary header version, for tests that
/// need a rejected archive.
pub fn build_car_with_version(version: u64, root: Cid, blocks: &[(Cid, Vec<u8>)]) -> Vec<u8> {
    let header = CarHeader {
        version,
        roots: vec![root],
    };
    let header_bytes = serde_ipld_dagcbor::to_vec(&header).expect("encode CAR header");
    let mut out = Vec::new();
    let mut buf = unsigned_varint::encode::u64_buffer();
    out.extend_from_slice(unsigned_varint::encode::u64(
        header_bytes.len() as u64,
        &mut buf,
    ));
    out.extend_from_slice(&header_bytes);
    for (cid, data) in blocks {
        let cid_bytes = cid.to_bytes();
        let mut buf = unsigned_varint::encode::u64_buffer();
        out.extend_from_slice(unsigned_varint::encode::u64(
            (cid_bytes.len() + data.len()) as u64,
            &mut buf,
        ));
        out.extend_from_slice(&cid_bytes);
        out.extend_from_slice(data);
    }
    out
}

/// Commit event with one create operation whose record is `record`.
pub fn create_event(seq: i64, path: &str, record: Vec<u8>) -> CommitEvent {
    let fixture = single_record_car(path, record);
    CommitEvent {
        seq,
        rebase: false,
        too_big: false,
        repo: TEST_REPO.to_string(),
        commit: fixture.commit_cid,
        rev: "3lcrexample2c".to_string(),
        since: None,
        blocks: fixture.car,
        ops: vec![RepoOp {
            action: OpAction::Create,
            path: path.to_string(),
            cid: Some(fixture.record_cid),
        }],
        time: "2026-08-07T12:00:00.000Z".to_string(),
    }
}
