//! Decoded record content.
//!
//! Records arrive as DAG-CBOR and are decoded into a generic field mapping
//! rather than a fixed schema; accessors return `Option`/`bool` instead of
//! panicking when a field is absent or has an unexpected shape.

use crate::{Error, Result};
use ipld_core::ipld::Ipld;
use std::collections::BTreeMap;

/// The decoded logical content of one record: field name to dynamically
/// typed value (string, number, boolean, bytes, link, list, or nested map).
#[derive(Debug, Clone, PartialEq)]
pub struct Record(BTreeMap<String, Ipld>);

/// Decode canonical record bytes into a field mapping.
///
/// Fails with [`Error::RecordDecode`] on malformed CBOR or a non-map root;
/// both skip only the enclosing operation.
pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    let value: Ipld = serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| Error::RecordDecode(e.to_string()))?;
    match value {
        Ipld::Map(fields) => Ok(Record(fields)),
        other => Err(Error::RecordDecode(format!(
            "expected a map at the record root, got {other:?}"
        ))),
    }
}

impl Record {
    /// Value of a field, if present.
    pub fn field(&self, name: &str) -> Option<&Ipld> {
        self.0.get(name)
    }

    /// String value of a field; `None` when absent or not a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Ipld::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Whether a field is present with a non-null value.
    pub fn has_populated(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !matches!(v, Ipld::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde::Serialize;

    #[test]
    fn test_decode_post_fields() {
        let record = decode_record(&testing::post_bytes("שלום", false)).expect("decode");
        assert_eq!(record.str_field("text"), Some("שלום"));
        assert_eq!(record.str_field("$type"), Some("app.bsky.feed.post"));
        assert!(record.field("createdAt").is_some());
        assert!(!record.has_populated("reply"));
    }

    #[test]
    fn test_reply_mapping_is_populated() {
        let record = decode_record(&testing::post_bytes("שלום", true)).expect("decode");
        assert!(record.has_populated("reply"));
        assert!(matches!(record.field("reply"), Some(Ipld::Map(_))));
    }

    #[test]
    fn test_null_field_is_not_populated() {
        #[derive(Serialize)]
        struct WithNull<'a> {
            text: &'a str,
            reply: Option<&'a str>, // serializes as null
        }
        let bytes = serde_ipld_dagcbor::to_vec(&WithNull {
            text: "hi",
            reply: None,
        })
        .expect("encode");
        let record = decode_record(&bytes).expect("decode");
        assert!(!record.has_populated("reply"));
        assert!(record.field("reply").is_some());
    }

    #[test]
    fn test_non_string_text_is_not_a_str_field() {
        #[derive(Serialize)]
        struct NumericText {
            text: u64,
        }
        let bytes = serde_ipld_dagcbor::to_vec(&NumericText { text: 7 }).expect("encode");
        let record = decode_record(&bytes).expect("decode");
        assert_eq!(record.str_field("text"), None);
        assert!(record.field("text").is_some());
    }

    #[test]
    fn test_non_map_root_is_rejected() {
        let bytes = serde_ipld_dagcbor::to_vec(&"just a string").expect("encode");
        assert!(matches!(
            decode_record(&bytes),
            Err(Error::RecordDecode(_))
        ));
    }

    #[test]
    fn test_malformed_cbor_is_rejected() {
        assert!(matches!(
            decode_record(&[0xff, 0xff, 0xff]),
            Err(Error::RecordDecode(_))
        ));
    }
}
