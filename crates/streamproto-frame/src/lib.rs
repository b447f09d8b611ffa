//! Self-delimiting command frames for serial links.
//!
//! Every packet is framed with:
//! - An 8-byte little-endian header word carrying the total frame length
//!   (45 bits) and a 4-bit fragmentation flag
//! - A 1-byte payload type
//! - A 1-byte command ID
//!
//! Frames are at most 1024 bytes. There is no magic number; the receiving
//! side recovers from noise by rejecting implausible lengths and sliding
//! forward one byte at a time (see [`Reassembler`]).

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod command;
pub mod error;
pub mod reassembler;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::PacketCodec;
pub use codec::{
    decode, encode, encode_into, FrameConfig, Header, ParsedPacket, PayloadType, FRAGED,
    HEADER_SIZE, MAX_FRAME_LEN, MAX_PAYLOAD, MIN_FRAME_LEN, UNFRAGED,
};
pub use command::{
    command_name, is_syscall, CMD_PING, CMD_PONG, CMD_STDERR, CMD_STDIN, CMD_STDOUT, SYS_CHDIR,
    SYS_EXEC, SYS_GETCWD, SYS_LS,
};
pub use error::{FrameError, Result};
pub use reader::{PacketReader, Packets};
pub use reassembler::{Reassembler, ReassemblerState, ReassemblerStats};
pub use writer::PacketWriter;
