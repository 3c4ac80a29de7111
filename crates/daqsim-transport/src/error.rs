/// Errors that can occur in transport operations.
///
/// Every variant is fatal to the session that owns the transport: the drive
/// loop stops on the first one it sees.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end closed the connection.
    #[error("peer closed the connection")]
    PeerClosed,

    /// `recv`/`send` was called before a connection was established.
    #[error("transport not connected")]
    NotConnected,

    /// Failed to open or configure a serial device.
    #[error("serial port {path}: {message}")]
    Serial { path: String, message: String },

    /// The listen address could not be parsed.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
