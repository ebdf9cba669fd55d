//! error.rs
//! Error types for the bridge boundaries that can actually fail.
//!
//! Decoding, solving and bus resolution are best-effort and never return
//! errors; only socket setup, outbound HTTP and config loading do.

use std::net::SocketAddr;

/// Result alias for receiver operations.
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// UDP listener failures. Fatal to the listener only.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// Port already taken or interface unavailable
    #[error("failed to bind UDP {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket setup error other than bind
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind address could not be parsed
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),
}

/// Outbound remote-endpoint failures. Counted by the dispatcher, never
/// propagated to the control loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("connect to {0} failed: {1}")]
    Connect(String, #[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote returned HTTP {0}")]
    BadStatus(u16),

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("invalid stats JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration loading failures (binary only).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
