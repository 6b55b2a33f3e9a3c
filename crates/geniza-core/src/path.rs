//! Record path parsing and identifier grammar checks.
//!
//! A repo operation names its target as `collection/rkey`, e.g.
//! `app.bsky.feed.post/3kabc123def2x`. The collection is a namespaced
//! identifier (reverse-domain authority plus a name segment); the record key
//! is a short URL-safe token. Both grammars are checked here so nothing
//! downstream has to re-validate.

use crate::{Error, Result};
use std::fmt;

/// Maximum overall length of a namespaced collection identifier.
const MAX_NSID_LEN: usize = 317;

/// Maximum length of a record key.
const MAX_RKEY_LEN: usize = 512;

/// A namespaced collection identifier, e.g. `app.bsky.feed.post`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nsid(String);

/// A record key within a collection, e.g. `3kabc123def2x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey(String);

/// A repository-relative record path: collection plus record key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPath {
    /// The namespaced collection the record lives in.
    pub collection: Nsid,
    /// The key of the record within the collection.
    pub rkey: RecordKey,
}

impl RecordPath {
    /// Split a path into exactly two validated segments.
    ///
    /// Fails with [`Error::MalformedPath`] when the path has any shape other
    /// than `collection/rkey`, or when either segment fails its grammar.
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.splitn(3, '/').collect();
        let &[collection, rkey] = parts.as_slice() else {
            return Err(Error::MalformedPath(format!(
                "expected collection/rkey, got {path:?}"
            )));
        };
        Ok(Self {
            collection: Nsid::parse(collection)?,
            rkey: RecordKey::parse(rkey)?,
        })
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.rkey)
    }
}

impl Nsid {
    /// Validate a namespaced identifier.
    ///
    /// Requires at least three dot-separated segments of 1-63 characters.
    /// Authority segments are alphanumeric plus interior hyphens and may not
    /// start with a digit in the leading segment; the final name segment
    /// starts with a letter and holds only letters and digits.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_NSID_LEN {
            return Err(Error::MalformedPath(format!(
                "collection {s:?} has invalid length"
            )));
        }
        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() < 3 {
            return Err(Error::MalformedPath(format!(
                "collection {s:?} needs at least three segments"
            )));
        }
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() || segment.len() > 63 {
                return Err(Error::MalformedPath(format!(
                    "collection segment {segment:?} has invalid length"
                )));
            }
            if segment.starts_with('-') || segment.ends_with('-') {
                return Err(Error::MalformedPath(format!(
                    "collection segment {segment:?} has a leading or trailing hyphen"
                )));
            }
            if i == last {
                let mut chars = segment.chars();
                let first = chars.next().unwrap_or_default();
                if !first.is_ascii_alphabetic()
                    || !chars.all(|c| c.is_ascii_alphanumeric())
                {
                    return Err(Error::MalformedPath(format!(
                        "collection name segment {segment:?} is invalid"
                    )));
                }
            } else {
                if i == 0 && segment.starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(Error::MalformedPath(format!(
                        "collection authority {segment:?} starts with a digit"
                    )));
                }
                if !segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
                {
                    return Err(Error::MalformedPath(format!(
                        "collection segment {segment:?} holds invalid characters"
                    )));
                }
            }
        }
        Ok(Self(s.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RecordKey {
    /// Validate a record key: 1-512 characters of `[A-Za-z0-9._:~-]`,
    /// excluding the reserved `.` and `..`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_RKEY_LEN {
            return Err(Error::MalformedPath(format!(
                "record key {s:?} has invalid length"
            )));
        }
        if s == "." || s == ".." {
            return Err(Error::MalformedPath(format!(
                "record key {s:?} is reserved"
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '~' | '-'))
        {
            return Err(Error::MalformedPath(format!(
                "record key {s:?} holds invalid characters"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_path_round_trips() {
        for path in [
            "app.bsky.feed.post/3kabc123def2x",
            "app.bsky.graph.follow/self",
            "com.example.my-app.record/a.b_c:d~e",
        ] {
            let parsed = RecordPath::parse(path).expect(path);
            assert_eq!(parsed.to_string(), path);
            assert_eq!(
                format!("{}/{}", parsed.collection.as_str(), parsed.rkey.as_str()),
                path
            );
        }
    }

    #[test]
    fn test_wrong_segment_count_is_rejected() {
        for path in [
            "app.bsky.feed.post",
            "app.bsky.feed.post/a/b",
            "app.bsky.feed.post/a/",
            "",
            "/",
        ] {
            assert!(
                matches!(RecordPath::parse(path), Err(Error::MalformedPath(_))),
                "expected rejection for {path:?}"
            );
        }
    }

    #[test]
    fn test_empty_segments_are_rejected() {
        assert!(RecordPath::parse("/3kabc").is_err());
        assert!(RecordPath::parse("app.bsky.feed.post/").is_err());
    }

    #[test]
    fn test_invalid_collections_are_rejected() {
        for collection in [
            "post",                  // too few segments
            "bsky.post",             // too few segments
            "app..post",             // empty segment
            "9app.bsky.post",        // leading digit in authority
            "app.-bsky.post",        // leading hyphen
            "app.bsky-.post",        // trailing hyphen
            "app.bsky.3post",        // name starts with digit
            "app.bsky.po-st",        // hyphen in name segment
            "app.bsky.po st",        // whitespace
        ] {
            assert!(
                Nsid::parse(collection).is_err(),
                "expected rejection for {collection:?}"
            );
        }
    }

    #[test]
    fn test_collection_length_limits() {
        let long_segment = "a".repeat(64);
        assert!(Nsid::parse(&format!("app.bsky.{long_segment}")).is_err());
        let long_nsid = format!("{}.{}.{}", "a".repeat(63), "b".repeat(63), "c".repeat(63));
        assert!(Nsid::parse(&long_nsid).is_ok());
    }

    #[test]
    fn test_invalid_record_keys_are_rejected() {
        for rkey in [".", "..", "a b", "a/b", "a\u{05d0}", ""] {
            assert!(
                RecordKey::parse(rkey).is_err(),
                "expected rejection for {rkey:?}"
            );
        }
        assert!(RecordKey::parse(&"x".repeat(513)).is_err());
        assert!(RecordKey::parse(&"x".repeat(512)).is_ok());
    }
}
