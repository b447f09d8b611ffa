/// Errors that can occur while opening or configuring a transport stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint address: {0:?}")]
    InvalidAddress(String),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
