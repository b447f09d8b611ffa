/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The encoded frame would exceed the maximum frame length.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Fewer bytes than a header were supplied.
    #[error("frame too short ({len} bytes, header needs 8)")]
    FrameTooShort { len: usize },

    /// The supplied byte count does not match the header's declared length.
    #[error("frame length mismatch (header declares {declared} bytes, got {actual})")]
    InvalidLength { declared: u64, actual: usize },

    /// The frame is structurally invalid.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended; any partially received frame is discarded.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
