//! `tokio_util` codec over the same resynchronizing state machine.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_into, ParsedPacket};
use crate::error::FrameError;
use crate::reassembler::{FrameScanner, ReassemblerState, ReassemblerStats};

/// Decodes packets out of a byte stream and encodes packets onto one.
///
/// Use with `FramedRead`/`FramedWrite`/`Framed`. Decoding never fails: noise
/// is skipped and undecodable frames are dropped, exactly as
/// [`crate::Reassembler`] does.
#[derive(Debug, Default)]
pub struct PacketCodec {
    scanner: FrameScanner,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReassemblerState {
        self.scanner.state()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.scanner.stats()
    }
}

impl Decoder for PacketCodec {
    type Item = ParsedPacket;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let packet = self.scanner.poll(src);
        if packet.is_none() {
            if let ReassemblerState::ReadingBody { total_length } = self.scanner.state() {
                src.reserve(total_length.saturating_sub(src.len()));
            }
        }
        Ok(packet)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None => {
                if !buf.is_empty() {
                    debug!(
                        buffered = buf.len(),
                        "stream closed mid-frame, discarding partial bytes"
                    );
                    buf.clear();
                }
                self.scanner.reset();
                Ok(None)
            }
        }
    }
}

impl Encoder<ParsedPacket> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: ParsedPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(
            item.payload(),
            item.fragmentation_flag(),
            item.payload_type(),
            item.user_field(),
            dst,
        )
    }
}
