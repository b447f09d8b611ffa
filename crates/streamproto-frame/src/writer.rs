use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use streamproto_transport::SerialStream;

use crate::codec::{encode_into, FrameConfig, ParsedPacket, PayloadType, MAX_FRAME_LEN, UNFRAGED};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Writes complete frames to any `Write` stream.
///
/// Encoding happens before anything touches the stream, so a payload that
/// does not fit fails with nothing written.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> PacketWriter<T> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_LEN),
            config,
        }
    }

    /// Encode and send an unfragmented packet.
    pub fn send(
        &mut self,
        command_id: u8,
        payload_type: PayloadType,
        payload: &[u8],
    ) -> Result<()> {
        self.send_with_flag(UNFRAGED, command_id, payload_type, payload)
    }

    /// Encode and send a packet with an explicit fragmentation flag.
    pub fn send_with_flag(
        &mut self,
        fragmentation_flag: u8,
        command_id: u8,
        payload_type: PayloadType,
        payload: &[u8],
    ) -> Result<()> {
        self.buf.clear();
        encode_into(
            payload,
            fragmentation_flag,
            payload_type,
            command_id,
            &mut self.buf,
        )?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => self.back_off(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Re-encode and send a packet, e.g. to echo one back.
    pub fn write_packet(&mut self, packet: &ParsedPacket) -> Result<()> {
        self.send_with_flag(
            packet.fragmentation_flag(),
            packet.user_field(),
            packet.payload_type(),
            packet.payload().as_ref(),
        )
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => self.back_off(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Wait `poll_interval` before retrying a stream that is not ready.
    fn back_off(&self) {
        if !self.config.poll_interval.is_zero() {
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl PacketWriter<SerialStream> {
    /// Create a packet writer for `SerialStream` and apply write timeout from config.
    pub fn with_config_stream(inner: SerialStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
