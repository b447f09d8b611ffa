//! Command framing over serial links.
//!
//! streamproto carries command packets between a host and a small device over
//! a byte stream that may drop, split or corrupt data. Frames are
//! length-prefixed and self-delimiting; the receiver resynchronizes after
//! noise without any help from the sender.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte stream handles (UDS, TCP bridges in front of the device)
//! - [`frame`]: Frame codec, stream reassembler, packet reader/writer

/// Re-export transport types.
pub mod transport {
    pub use streamproto_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use streamproto_frame::*;
}
