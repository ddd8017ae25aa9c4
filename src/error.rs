//! Error types for botgate-client.

use thiserror::Error;

/// Main error type for all gateway client operations.
#[derive(Debug, Error)]
pub enum BotgateError {
    /// I/O error during channel operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (both channels).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket-level failure on the stream channel.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP-level failure on the request channel.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Protocol error (malformed envelope, unexpected shape, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The channel required for this operation is not connected.
    #[error("Channel not connected")]
    NotConnected,

    /// Channel closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The gateway rejected a request with a non-zero retcode.
    #[error("Gateway returned retcode {retcode}")]
    Gateway {
        /// Non-zero return code reported by the gateway.
        retcode: i64,
    },

    /// The access token cannot be carried in an HTTP header.
    #[error("Access token is not a valid header value")]
    InvalidToken,
}

/// Result type alias using BotgateError.
pub type Result<T> = std::result::Result<T, BotgateError>;
