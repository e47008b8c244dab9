//! Crate-level error type.
//!
//! Runtime failures in the presentation clients are almost never fatal: the
//! frame loops log and carry on. `PresenterError` exists so that library
//! functions can still return a precise `Result` and let the caller decide
//! whether to surface or swallow the failure.

use thiserror::Error;

/// Errors produced by the socket facade, protocol codec and configuration
/// loader.
#[derive(Debug, Error)]
pub enum PresenterError {
    /// `send` was called while the socket was not open.
    #[error("INVALID_STATE_ERR: pausing to reconnect websocket")]
    InvalidState,

    /// The socket task has exited (forced close, attempt cap reached, or the
    /// runtime is shutting down).
    #[error("socket task is no longer running")]
    SocketClosed,

    /// A single connection attempt did not complete within the timeout.
    #[error("connection attempt to {url} timed out after {timeout_ms} ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    /// Error from the underlying WebSocket implementation.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encode/decode failure on the engine protocol.
    #[error("protocol error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("invalid config file {path}: {detail}")]
    Config { path: String, detail: String },

    /// A dashboard command line could not be understood.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PresenterError>;
