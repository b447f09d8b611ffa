//! Frame extraction from an unreliable byte stream.
//!
//! Bytes arrive in arbitrary chunks: frames may be split across reads, glued
//! together, preceded by line noise or cut short by a device reset. The
//! reassembler runs a two-state machine over an accumulator:
//!
//! - `SeekingHeader`: wait for 8 bytes and read a candidate header. A
//!   declared length outside `[8, 1024]` means the candidate is not a header;
//!   exactly one byte is dropped from the front and the next offset is tried.
//! - `ReadingBody`: wait until the declared length is buffered, split it off,
//!   decode it. Undecodable frames are logged and dropped.

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::{decode_bytes, Header, ParsedPacket, HEADER_SIZE, MAX_FRAME_LEN};

/// Where the reassembler is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassemblerState {
    /// Looking for a plausible header at the front of the buffer.
    #[default]
    SeekingHeader,
    /// A header was accepted; waiting for the rest of the frame.
    ReadingBody { total_length: usize },
}

/// Counters describing what the reassembler has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReassemblerStats {
    /// Frames decoded and handed out.
    pub packets: u64,
    /// Frames with a plausible header that failed to decode.
    pub dropped_frames: u64,
    /// Bytes skipped while resynchronizing.
    pub discarded_bytes: u64,
}

/// The state machine, independent of who owns the buffer.
///
/// Shared by [`Reassembler`] and the async codec, which is handed its buffer
/// by `tokio_util`.
#[derive(Debug, Default)]
pub(crate) struct FrameScanner {
    state: ReassemblerState,
    stats: ReassemblerStats,
}

impl FrameScanner {
    pub(crate) fn state(&self) -> ReassemblerState {
        self.state
    }

    pub(crate) fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    pub(crate) fn reset(&mut self) {
        self.state = ReassemblerState::SeekingHeader;
    }

    /// Extract the next decodable packet from the front of `buf`.
    ///
    /// Returns `None` once `buf` holds no complete frame; the state is kept
    /// so the next call resumes where this one stopped.
    pub(crate) fn poll(&mut self, buf: &mut BytesMut) -> Option<ParsedPacket> {
        loop {
            match self.state {
                ReassemblerState::SeekingHeader => {
                    if buf.len() < HEADER_SIZE {
                        return None;
                    }
                    let header = Header::parse(&buf[..]).ok()?;
                    if !header.is_valid_length() {
                        trace!(
                            declared = header.total_length(),
                            "header candidate rejected, skipping one byte"
                        );
                        buf.advance(1);
                        self.stats.discarded_bytes += 1;
                        continue;
                    }
                    self.state = ReassemblerState::ReadingBody {
                        total_length: header.total_length() as usize,
                    };
                }
                ReassemblerState::ReadingBody { total_length } => {
                    if buf.len() < total_length {
                        return None;
                    }
                    let frame = buf.split_to(total_length).freeze();
                    self.state = ReassemblerState::SeekingHeader;

                    match decode_bytes(frame) {
                        Ok(packet) => {
                            self.stats.packets += 1;
                            return Some(packet);
                        }
                        Err(err) => {
                            self.stats.dropped_frames += 1;
                            warn!(error = %err, total_length, "dropping undecodable frame");
                        }
                    }
                }
            }
        }
    }
}

/// Accumulates stream bytes and hands out complete packets.
///
/// Front eviction is O(1): `BytesMut::advance` and `split_to` move the start
/// of the buffer without shifting the bytes behind it.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    scanner: FrameScanner,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    /// Create an empty reassembler sized for two maximum frames.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(2 * MAX_FRAME_LEN),
            scanner: FrameScanner::default(),
        }
    }

    /// Append bytes received from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete packet in the buffered bytes, if any.
    pub fn next_packet(&mut self) -> Option<ParsedPacket> {
        self.scanner.poll(&mut self.buf)
    }

    /// Push a chunk and drain every packet it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ParsedPacket> {
        self.push(bytes);
        std::iter::from_fn(|| self.next_packet()).collect()
    }

    pub fn state(&self) -> ReassemblerState {
        self.scanner.state()
    }

    /// Bytes held that have not been consumed yet.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.scanner.stats()
    }

    /// Drop all buffered bytes and start over. Counters are kept.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, PayloadType, MIN_FRAME_LEN, UNFRAGED};
    use crate::command::{CMD_STDERR, CMD_STDOUT, SYS_GETCWD};

    fn frame(command_id: u8, payload: &[u8]) -> Vec<u8> {
        encode(payload, UNFRAGED, PayloadType::String, command_id)
            .unwrap()
            .to_vec()
    }

    fn feed_in_chunks(stream: &[u8], chunk_size: usize) -> Vec<ParsedPacket> {
        let mut reassembler = Reassembler::new();
        stream
            .chunks(chunk_size)
            .flat_map(|chunk| reassembler.feed(chunk))
            .collect()
    }

    #[test]
    fn single_frame_in_one_chunk() {
        let mut reassembler = Reassembler::new();
        let packets = reassembler.feed(&frame(CMD_STDOUT, b"hello"));

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].user_field(), CMD_STDOUT);
        assert_eq!(packets[0].payload().as_ref(), b"hello");
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.state(), ReassemblerState::SeekingHeader);
    }

    #[test]
    fn resynchronizes_through_noise_at_any_chunking() {
        let first = frame(CMD_STDOUT, b"/home");
        let second = frame(CMD_STDERR, b"Error: Invalid directory\n");

        let mut stream = vec![0xFF; 7];
        stream.extend_from_slice(&first);
        stream.push(0x5A);
        stream.extend_from_slice(&second);

        for chunk_size in [1, 3, stream.len()] {
            let packets = feed_in_chunks(&stream, chunk_size);
            assert_eq!(packets.len(), 2, "chunk size {chunk_size}");
            assert_eq!(packets[0].user_field(), CMD_STDOUT);
            assert_eq!(packets[0].payload().as_ref(), b"/home");
            assert_eq!(packets[1].user_field(), CMD_STDERR);
            assert_eq!(packets[1].payload().as_ref(), b"Error: Invalid directory\n");
        }
    }

    #[test]
    fn noise_is_counted_not_reported() {
        let mut stream = vec![0xFF; 7];
        stream.extend_from_slice(&frame(SYS_GETCWD, b""));

        let mut reassembler = Reassembler::new();
        let packets = reassembler.feed(&stream);

        assert_eq!(packets.len(), 1);
        assert_eq!(reassembler.stats().discarded_bytes, 7);
        assert_eq!(reassembler.stats().packets, 1);
        assert_eq!(reassembler.stats().dropped_frames, 0);
    }

    #[test]
    fn byte_at_a_time_yields_only_on_last_byte() {
        let wire = frame(CMD_STDOUT, b"split delivery");
        let mut reassembler = Reassembler::new();

        for (i, byte) in wire.iter().enumerate() {
            let packets = reassembler.feed(std::slice::from_ref(byte));
            if i + 1 < wire.len() {
                assert!(packets.is_empty(), "packet emitted early at byte {i}");
            } else {
                assert_eq!(packets.len(), 1);
                assert_eq!(packets[0].payload().as_ref(), b"split delivery");
            }
        }
    }

    #[test]
    fn state_transitions_are_observable() {
        let wire = frame(CMD_STDOUT, b"abc");
        let mut reassembler = Reassembler::new();

        reassembler.push(&wire[..HEADER_SIZE - 1]);
        assert!(reassembler.next_packet().is_none());
        assert_eq!(reassembler.state(), ReassemblerState::SeekingHeader);

        reassembler.push(&wire[HEADER_SIZE - 1..HEADER_SIZE + 1]);
        assert!(reassembler.next_packet().is_none());
        assert_eq!(
            reassembler.state(),
            ReassemblerState::ReadingBody {
                total_length: wire.len()
            }
        );

        reassembler.push(&wire[HEADER_SIZE + 1..]);
        assert!(reassembler.next_packet().is_some());
        assert_eq!(reassembler.state(), ReassemblerState::SeekingHeader);
    }

    #[test]
    fn undersized_length_is_never_a_body() {
        // Header declaring total_length = 4, followed by a real frame.
        let bogus = Header::new(4, UNFRAGED).to_bytes();
        let wire = frame(CMD_STDOUT, b"after");

        let mut reassembler = Reassembler::new();
        reassembler.push(&bogus);
        assert!(reassembler.next_packet().is_none());
        assert_eq!(reassembler.state(), ReassemblerState::SeekingHeader);
        assert_eq!(reassembler.buffered_len(), HEADER_SIZE - 1);

        let packets = reassembler.feed(&wire);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload().as_ref(), b"after");
        assert_eq!(reassembler.stats().discarded_bytes, HEADER_SIZE as u64);
    }

    #[test]
    fn oversized_length_is_skipped_without_waiting() {
        let bogus = Header::new(4096, UNFRAGED).to_bytes();

        let mut reassembler = Reassembler::new();
        assert!(reassembler.feed(&bogus).is_empty());
        assert_eq!(reassembler.state(), ReassemblerState::SeekingHeader);
        assert_eq!(reassembler.buffered_len(), HEADER_SIZE - 1);
        assert_eq!(reassembler.stats().discarded_bytes, 1);
    }

    #[test]
    fn corrupt_body_drops_exactly_one_frame() {
        let mut broken = frame(CMD_STDOUT, b"garbled");
        broken[HEADER_SIZE] = 0xEE;
        let good = frame(CMD_STDOUT, b"intact");

        let mut stream = broken.clone();
        stream.extend_from_slice(&good);

        for chunk_size in [1, 3, stream.len()] {
            let mut reassembler = Reassembler::new();
            let packets: Vec<_> = stream
                .chunks(chunk_size)
                .flat_map(|chunk| reassembler.feed(chunk))
                .collect();

            assert_eq!(packets.len(), 1, "chunk size {chunk_size}");
            assert_eq!(packets[0].payload().as_ref(), b"intact");
            assert_eq!(reassembler.stats().dropped_frames, 1);
            assert_eq!(reassembler.stats().discarded_bytes, 0);
        }
    }

    #[test]
    fn header_only_frame_is_consumed_and_dropped() {
        // Length 8 passes the range check but has no metadata.
        let mut stream = Header::new(HEADER_SIZE as u64, UNFRAGED).to_bytes().to_vec();
        stream.extend_from_slice(&frame(CMD_STDOUT, b"next"));

        let mut reassembler = Reassembler::new();
        let packets = reassembler.feed(&stream);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload().as_ref(), b"next");
        assert_eq!(reassembler.stats().dropped_frames, 1);
    }

    #[test]
    fn back_to_back_frames_in_one_chunk() {
        let mut stream = Vec::new();
        for i in 0..10u8 {
            stream.extend_from_slice(&frame(i, &[i; 3]));
        }

        let packets = feed_in_chunks(&stream, stream.len());
        assert_eq!(packets.len(), 10);
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.user_field(), i as u8);
            assert_eq!(packet.payload().as_ref(), &[i as u8; 3]);
        }
    }

    #[test]
    fn long_noise_run_keeps_buffer_bounded() {
        let mut reassembler = Reassembler::new();
        let noise = vec![0xFF; 64 * 1024];

        for chunk in noise.chunks(MAX_FRAME_LEN) {
            assert!(reassembler.feed(chunk).is_empty());
            assert!(reassembler.buffered_len() < HEADER_SIZE);
        }

        let packets = reassembler.feed(&frame(CMD_STDOUT, b"alive"));
        assert_eq!(packets.len(), 1);
        assert_eq!(reassembler.stats().discarded_bytes, noise.len() as u64);
    }

    #[test]
    fn stalled_body_parks_in_reading_body() {
        let wire = frame(CMD_STDOUT, b"never finished");
        let mut reassembler = Reassembler::new();
        assert!(reassembler.feed(&wire[..MIN_FRAME_LEN]).is_empty());
        assert!(matches!(
            reassembler.state(),
            ReassemblerState::ReadingBody { .. }
        ));

        reassembler.reset();
        assert_eq!(reassembler.state(), ReassemblerState::SeekingHeader);
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(
            reassembler.feed(&frame(CMD_STDOUT, b"fresh"))[0]
                .payload()
                .as_ref(),
            b"fresh"
        );
    }
}
