use std::path::PathBuf;

/// Errors that can occur in message port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the port stream.
    #[error("port I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Frame does not start with the expected magic bytes.
    #[error("invalid frame magic")]
    InvalidMagic,

    /// Frame body exceeds the configured maximum.
    #[error("frame body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// The connection was closed by the peer.
    #[error("connection closed")]
    Closed,

    /// A frame body was not valid JSON.
    #[error("frame body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The origin handshake with the peer failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
}

pub type Result<T> = std::result::Result<T, PortError>;
