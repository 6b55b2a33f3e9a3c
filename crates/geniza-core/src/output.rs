//! Line-delimited JSON output.

use crate::Result;
use serde::Serialize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// One matched post, serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    /// Stream sequence number of the enclosing event.
    pub seq: i64,
    /// Repository revision after the commit.
    pub rev: String,
    /// Event wall-clock time, passed through verbatim.
    pub time: String,
    /// Record key of the post.
    pub rkey: String,
    /// Verified content identifier of the record block.
    pub cid: String,
    /// Post text, unmodified.
    pub text: String,
}

/// Serializes output records to a shared sink, one line per record.
///
/// Workers emit concurrently; the mutex keeps each line whole. Write
/// failures propagate to the caller: a broken sink makes further writes
/// pointless.
pub struct Emitter<W> {
    sink: Mutex<W>,
}

impl<W: Write> Emitter<W> {
    /// Wrap a sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Write one record as a JSON line and flush it.
    pub fn emit(&self, record: &OutputRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(sink, "{line}")?;
        sink.flush()?;
        Ok(())
    }

    /// Recover the underlying sink, e.g. to inspect captured test output.
    pub fn into_inner(self) -> W {
        self.sink
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Emitter<std::io::Stdout> {
    /// Emitter over the process's standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq: i64, text: &str) -> OutputRecord {
        OutputRecord {
            seq,
            rev: "3lcrexample2c".to_string(),
            time: "2026-08-07T12:00:00.000Z".to_string(),
            rkey: "3kabc123def2x".to_string(),
            cid: "bafyreib2rxk3rybk3aobmv5cjuql3bm2twh4jo5uxgf6kpnrkbdxrrvhpq".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_emit_writes_one_json_line_per_record() {
        let emitter = Emitter::new(Vec::new());
        emitter.emit(&sample(1, "שלום עולם")).expect("emit");
        emitter.emit(&sample(2, "second")).expect("emit");

        let out = String::from_utf8(emitter.into_inner()).expect("utf8");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["seq"], 1);
        assert_eq!(first["text"], "שלום עולם");
        assert_eq!(first["rkey"], "3kabc123def2x");
    }

    #[test]
    fn test_field_order_matches_contract() {
        let emitter = Emitter::new(Vec::new());
        emitter.emit(&sample(7, "x")).expect("emit");
        let out = String::from_utf8(emitter.into_inner()).expect("utf8");
        let keys: Vec<usize> = ["\"seq\"", "\"rev\"", "\"time\"", "\"rkey\"", "\"cid\"", "\"text\""]
            .iter()
            .map(|k| out.find(k).expect(k))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_write_failures_propagate() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "sink is gone",
                ))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let emitter = Emitter::new(Broken);
        assert!(emitter.emit(&sample(1, "x")).is_err());
    }
}
