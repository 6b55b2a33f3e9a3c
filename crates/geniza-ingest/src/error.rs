//! Error types for the stream driver.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the subscription.
#[derive(Error, Debug)]
pub enum Error {
    /// The configured relay endpoint is not a valid URL.
    #[error("invalid relay endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The upstream closed or terminated the subscription.
    #[error("subscription terminated: {0}")]
    Terminated(String),

    /// Core pipeline error.
    #[error(transparent)]
    Core(#[from] geniza_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
