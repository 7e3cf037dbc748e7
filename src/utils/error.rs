// src/utils/error.rs
use serde_json;
use std::io;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use url;

/// Main error type for the mining coordinator
///
/// Configuration and lifecycle errors are returned from `configure`/`start`.
/// Everything that happens inside a running session is reported through the
/// `mining_error` callback instead of being returned.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Bad setup, rejected before mining starts
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation not allowed in the coordinator's current lifecycle state
    #[error("Invalid state: {0}")]
    StateError(String),

    /// Transient network failure; the pool connection retries with backoff
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Pool refused the login; fatal for the affected worker
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Pool rejected a submitted share
    #[error("Share rejected: {0}")]
    ShareRejectedError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Errors raised by a hashing backend
    #[error("Algorithm error: {0}")]
    AlgorithmError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// Config file parsing errors
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// WebSocket communication errors
    #[error("WebSocket error: {0}")]
    WsError(#[from] tungstenite::Error),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

impl MinerError {
    /// Whether the failure is worth retrying with backoff
    ///
    /// Network and protocol hiccups are transient. Authentication, share
    /// threshold, configuration and state errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MinerError::ConnectionError(_)
                | MinerError::ProtocolError(_)
                | MinerError::IoError(_)
                | MinerError::WsError(_)
                | MinerError::JsonError(_)
        )
    }

    /// Whether the error ends the affected worker for the rest of the session
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// A closed request channel means the pool link task has gone away.
impl<T> From<mpsc::error::SendError<T>> for MinerError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        MinerError::ConnectionError("Pool link closed".into())
    }
}

/// A dropped reply sender means the link died before answering.
impl From<oneshot::error::RecvError> for MinerError {
    fn from(_: oneshot::error::RecvError) -> Self {
        MinerError::ConnectionError("Pool link dropped the request".into())
    }
}

/// Converts hex decoding errors into MinerError
///
/// Hex only shows up in pool messages (blobs, targets, seed hashes), so a
/// decoding failure is a protocol violation.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::ProtocolError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}
