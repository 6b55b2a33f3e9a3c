//! Error types for the geniza pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning commit events into output records.
#[derive(Error, Debug)]
pub enum Error {
    /// A record path did not split into a valid collection and record key.
    #[error("malformed record path: {0}")]
    MalformedPath(String),

    /// A record could not be located in the event's block bundle, or the
    /// block graph leading to it was corrupt. Local to one event.
    #[error("block resolution failed: {0}")]
    BlockResolution(String),

    /// The CID asserted by a commit operation does not match the CID
    /// computed from the resolved record bytes.
    #[error("record CID mismatch: op asserts {asserted}, computed {computed}")]
    CidMismatch {
        /// The CID carried on the operation ("missing" when absent).
        asserted: String,
        /// The CID computed over the resolved bytes.
        computed: String,
    },

    /// Record bytes were not valid DAG-CBOR, or not a field mapping.
    #[error("record decode failed: {0}")]
    RecordDecode(String),

    /// A stream frame could not be decoded.
    #[error("frame decode failed: {0}")]
    Frame(String),

    /// The stream delivered an error frame; the subscription is over.
    #[error("stream error frame: {error}: {message}")]
    ErrorFrame {
        /// Machine-readable error code from the relay.
        error: String,
        /// Human-readable detail, possibly empty.
        message: String,
    },

    /// An upstream schema guarantee did not hold (e.g. a post record with
    /// no text string). Reported loudly, never trusted.
    #[error("schema invariant violated: {0}")]
    InvariantViolation(String),

    /// I/O error from the output sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_mismatch_display() {
        let err = Error::CidMismatch {
            asserted: "bafyabc".to_string(),
            computed: "bafydef".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bafyabc"));
        assert!(msg.contains("bafydef"));
        assert!(msg.contains("CID mismatch"));
    }

    #[test]
    fn test_error_frame_display() {
        let err = Error::ErrorFrame {
            error: "FutureCursor".to_string(),
            message: "cursor in the future".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("FutureCursor"));
        assert!(msg.contains("cursor in the future"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
