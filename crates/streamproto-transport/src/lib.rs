//! Byte stream transport for streamproto.
//!
//! The framing layer never opens or configures a serial device itself. It
//! talks to an already-open byte stream, typically a bridge in front of the
//! device:
//! - Unix domain sockets (e.g. `socat` exposing a tty)
//! - TCP (e.g. `ser2net`)
//!
//! Everything above this crate works against [`SerialStream`], which
//! implements `Read + Write` and can be cloned so the receive path and the
//! send path each own a handle.

pub mod endpoint;
pub mod error;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use stream::SerialStream;
