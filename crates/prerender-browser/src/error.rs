//! Rendering engine errors.

use thiserror::Error;

/// Errors raised while driving a browser page.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The browser is in a recoverable bad state; the page should be
    /// replaced and the render may be retried.
    #[error("Temporary browser failure: {0}")]
    TemporaryBrowserFailure(String),

    /// The page loaded but too many of its assets failed.
    #[error("Too many failed responses")]
    TooManyResponses,

    /// A wall-clock budget was exhausted.
    #[error("Timed out {0}")]
    Timeout(String),

    /// The WebSocket terminated while a response was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The browser answered a request with an error frame.
    #[error("Protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// HTTP error against the browser's control endpoint.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JavaScript evaluation raised in the page.
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// A frame or response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Unsupported MHTML part encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The pool has no live pages at all.
    #[error("No browser available")]
    NoBrowserAvailable,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for RenderError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RenderError::ConnectionClosed,
            other => RenderError::WebSocket(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(e: reqwest::Error) -> Self {
        RenderError::Http(e.to_string())
    }
}
