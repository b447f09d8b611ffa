use std::io::{ErrorKind, Read};

use streamproto_transport::SerialStream;
use tracing::debug;

use crate::codec::{FrameConfig, ParsedPacket, MAX_FRAME_LEN};
use crate::error::{FrameError, Result};
use crate::reassembler::{Reassembler, ReassemblerStats};

/// One read never pulls more than a maximum frame off the transport.
const READ_CHUNK_SIZE: usize = MAX_FRAME_LEN;

/// Reads complete packets from any `Read` stream.
///
/// Noise, split frames and corrupt frames are handled internally by a
/// [`Reassembler`]; callers only ever see decoded packets.
///
/// A read that fails with `WouldBlock` or `TimedOut` means "no bytes yet":
/// the reader sleeps for [`FrameConfig::poll_interval`] and tries again.
/// `Ok(0)` from the stream is end of stream.
pub struct PacketReader<T> {
    inner: T,
    reassembler: Reassembler,
    config: FrameConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: Reassembler::new(),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<ParsedPacket> {
        loop {
            if let Some(packet) = self.reassembler.next_packet() {
                return Ok(packet);
            }

            if self.fill()? == 0 && !self.config.poll_interval.is_zero() {
                std::thread::sleep(self.config.poll_interval);
            }
        }
    }

    /// Make at most one read attempt and return a packet if one completed.
    ///
    /// Lets a caller interleave other work (checking a shutdown flag, say)
    /// with receiving.
    pub fn try_read_packet(&mut self) -> Result<Option<ParsedPacket>> {
        if let Some(packet) = self.reassembler.next_packet() {
            return Ok(Some(packet));
        }
        self.fill()?;
        Ok(self.reassembler.next_packet())
    }

    /// An unbounded iterator over received packets.
    ///
    /// The iterator ends after yielding the first error; end of stream is
    /// yielded as `FrameError::ConnectionClosed`.
    pub fn packets(&mut self) -> Packets<'_, T> {
        Packets {
            reader: self,
            done: false,
        }
    }

    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    if self.reassembler.buffered_len() > 0 {
                        debug!(
                            buffered = self.reassembler.buffered_len(),
                            "stream closed mid-frame, discarding partial bytes"
                        );
                    }
                    self.reassembler.reset();
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => {
                    self.reassembler.push(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(0)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Counters from the underlying reassembler.
    pub fn stats(&self) -> ReassemblerStats {
        self.reassembler.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Bytes of a partially received frame are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl PacketReader<SerialStream> {
    /// Create a packet reader for `SerialStream` and apply read timeout from config.
    pub fn with_config_stream(inner: SerialStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

/// Iterator returned by [`PacketReader::packets`].
pub struct Packets<'a, T> {
    reader: &'a mut PacketReader<T>,
    done: bool,
}

impl<T: Read> Iterator for Packets<'_, T> {
    type Item = Result<ParsedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_packet() {
            Ok(packet) => Some(Ok(packet)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

pub(crate) fn transport_to_frame_error(err: streamproto_transport::TransportError) -> FrameError {
    match err {
        streamproto_transport::TransportError::Io(io) => FrameError::Io(io),
        streamproto_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
