use std::path::PathBuf;

/// Errors raised by endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred while moving bytes.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel closed before the requested bytes moved.
    #[error("channel closed mid-transfer")]
    Closed,

    /// Binding a listening socket failed.
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Connecting to a remote endpoint failed.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        source: std::io::Error,
    },

    /// Accepting an incoming connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// A socket path exceeds the platform's `sun_path` capacity.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
