use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Header: one little-endian 64-bit word = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Payload type byte + command byte.
pub const METADATA_SIZE: usize = 2;

/// Smallest frame that carries metadata.
pub const MIN_FRAME_LEN: usize = HEADER_SIZE + METADATA_SIZE;

/// Largest frame accepted on the wire, header included.
pub const MAX_FRAME_LEN: usize = 1024;

/// Largest payload that fits in a single frame.
pub const MAX_PAYLOAD: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

/// Fragmentation flag for a complete, unfragmented packet.
pub const UNFRAGED: u8 = 0x0;

/// Fragmentation flag marking a fragment. Carried, not interpreted.
pub const FRAGED: u8 = 0x1;

const FLAG_MASK: u64 = 0xF;
const LENGTH_SHIFT: u32 = 4;
const LENGTH_MASK: u64 = 0x1FFF_FFFF_FFFF;

/// How a packet's payload bytes should be interpreted.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// No payload.
    None = 0x00,
    /// UTF-8 text.
    String = 0x01,
    /// Opaque binary data.
    Bytes = 0x02,
    /// `u8`.
    U8 = 0x03,
    /// `u16`, little-endian.
    U16 = 0x04,
    /// `u32`, little-endian.
    U32 = 0x05,
    /// `i32`, little-endian.
    I32 = 0x06,
}

impl PayloadType {
    /// The wire byte for this type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Short lowercase name, used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            PayloadType::None => "none",
            PayloadType::String => "string",
            PayloadType::Bytes => "bytes",
            PayloadType::U8 => "u8",
            PayloadType::U16 => "u16",
            PayloadType::U32 => "u32",
            PayloadType::I32 => "i32",
        }
    }
}

impl TryFrom<u8> for PayloadType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(PayloadType::None),
            0x01 => Ok(PayloadType::String),
            0x02 => Ok(PayloadType::Bytes),
            0x03 => Ok(PayloadType::U8),
            0x04 => Ok(PayloadType::U16),
            0x05 => Ok(PayloadType::U32),
            0x06 => Ok(PayloadType::I32),
            other => Err(FrameError::MalformedFrame(format!(
                "unknown payload type 0x{other:02x}"
            ))),
        }
    }
}

/// The 8-byte frame header.
///
/// ```text
///  63        49 48                      4 3      0
/// ┌────────────┬─────────────────────────┬────────┐
/// │ reserved   │ total_length (45 bits)  │ frag   │
/// │ (zero)     │ header + body, in bytes │ flag   │
/// └────────────┴─────────────────────────┴────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    total_length: u64,
    fragmentation_flag: u8,
}

impl Header {
    /// Build a header. Out-of-range bits are masked off.
    pub fn new(total_length: u64, fragmentation_flag: u8) -> Self {
        Self {
            total_length: total_length & LENGTH_MASK,
            fragmentation_flag: fragmentation_flag & FLAG_MASK as u8,
        }
    }

    /// Parse the header from the first 8 bytes of `src`.
    ///
    /// Reserved bits are ignored. Range checks are left to the caller; see
    /// [`Header::is_valid_length`].
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::FrameTooShort { len: src.len() });
        }
        let word = (&src[..HEADER_SIZE]).get_u64_le();
        Ok(Self::from_word(word))
    }

    fn from_word(word: u64) -> Self {
        Self {
            total_length: (word >> LENGTH_SHIFT) & LENGTH_MASK,
            fragmentation_flag: (word & FLAG_MASK) as u8,
        }
    }

    fn to_word(self) -> u64 {
        (self.total_length << LENGTH_SHIFT) | u64::from(self.fragmentation_flag)
    }

    /// Little-endian wire bytes.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        self.to_word().to_le_bytes()
    }

    /// Declared frame length, header included.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn fragmentation_flag(&self) -> u8 {
        self.fragmentation_flag
    }

    /// Whether the declared length is one the protocol can carry.
    ///
    /// Headers outside `[HEADER_SIZE, MAX_FRAME_LEN]` are treated as noise.
    pub fn is_valid_length(&self) -> bool {
        (HEADER_SIZE as u64..=MAX_FRAME_LEN as u64).contains(&self.total_length)
    }
}

/// A decoded frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    user_field: u8,
    payload: Bytes,
    payload_type: PayloadType,
    fragmentation_flag: u8,
}

impl ParsedPacket {
    /// Create an unfragmented packet.
    pub fn new(user_field: u8, payload_type: PayloadType, payload: impl Into<Bytes>) -> Self {
        Self {
            user_field,
            payload: payload.into(),
            payload_type,
            fragmentation_flag: UNFRAGED,
        }
    }

    /// The command ID (see [`crate::command`]).
    pub fn user_field(&self) -> u8 {
        self.user_field
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn fragmentation_flag(&self) -> u8 {
        self.fragmentation_flag
    }

    /// Consume the packet and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The total wire size of this packet once encoded.
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_LEN + self.payload.len()
    }
}

/// Encode a packet into a new buffer.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────────────┬──────────────────────┐
/// │ Header (8B)  │ Payload type │ Command ID  │ Payload              │
/// │ u64 LE       │ (1B)         │ (1B)        │ (total_length - 10B) │
/// └──────────────┴──────────────┴─────────────┴──────────────────────┘
/// ```
pub fn encode(
    payload: &[u8],
    fragmentation_flag: u8,
    payload_type: PayloadType,
    command_id: u8,
) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(payload, fragmentation_flag, payload_type, command_id, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode a packet, appending it to `dst`.
///
/// Nothing is written to `dst` when the payload does not fit.
pub fn encode_into(
    payload: &[u8],
    fragmentation_flag: u8,
    payload_type: PayloadType,
    command_id: u8,
    dst: &mut BytesMut,
) -> Result<()> {
    let total_length = MIN_FRAME_LEN + payload.len();
    if total_length > MAX_FRAME_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let header = Header::new(total_length as u64, fragmentation_flag);
    dst.reserve(total_length);
    dst.put_u64_le(header.to_word());
    dst.put_u8(payload_type.as_u8());
    dst.put_u8(command_id);
    dst.put_slice(payload);
    Ok(())
}

/// Decode exactly one frame.
///
/// `frame` must hold exactly the header's declared length; the payload is
/// copied out of it.
pub fn decode(frame: &[u8]) -> Result<ParsedPacket> {
    let (header, payload_type, command_id) = parse_frame(frame)?;
    Ok(ParsedPacket {
        user_field: command_id,
        payload: Bytes::copy_from_slice(&frame[MIN_FRAME_LEN..]),
        payload_type,
        fragmentation_flag: header.fragmentation_flag(),
    })
}

/// Decode a frame already split off the accumulator, without copying.
pub(crate) fn decode_bytes(frame: Bytes) -> Result<ParsedPacket> {
    let (header, payload_type, command_id) = parse_frame(&frame)?;
    Ok(ParsedPacket {
        user_field: command_id,
        payload: frame.slice(MIN_FRAME_LEN..),
        payload_type,
        fragmentation_flag: header.fragmentation_flag(),
    })
}

fn parse_frame(frame: &[u8]) -> Result<(Header, PayloadType, u8)> {
    let header = Header::parse(frame)?;

    if header.total_length() != frame.len() as u64 {
        return Err(FrameError::InvalidLength {
            declared: header.total_length(),
            actual: frame.len(),
        });
    }
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::MalformedFrame(format!(
            "{} bytes leaves no room for type and command (need {MIN_FRAME_LEN})",
            frame.len()
        )));
    }
    if frame.len() > MAX_FRAME_LEN {
        return Err(FrameError::MalformedFrame(format!(
            "{} bytes exceeds maximum frame length {MAX_FRAME_LEN}",
            frame.len()
        )));
    }

    let payload_type = PayloadType::try_from(frame[HEADER_SIZE])?;
    let command_id = frame[HEADER_SIZE + 1];
    Ok((header, payload_type, command_id))
}

/// Configuration for packet readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Read timeout applied to the transport. Default: 100 ms.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to the transport.
    pub write_timeout: Option<Duration>,
    /// Sleep between reads that returned no bytes. Default: 5 ms.
    ///
    /// Zero disables the sleep; only do that when the transport read itself
    /// blocks (a read timeout is set).
    pub poll_interval: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_millis(100)),
            write_timeout: None,
            poll_interval: Duration::from_millis(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [PayloadType; 7] = [
        PayloadType::None,
        PayloadType::String,
        PayloadType::Bytes,
        PayloadType::U8,
        PayloadType::U16,
        PayloadType::U32,
        PayloadType::I32,
    ];

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = b"hello, device!";
        let wire = encode(payload, UNFRAGED, PayloadType::String, 101).unwrap();

        assert_eq!(wire.len(), MIN_FRAME_LEN + payload.len());

        let packet = decode(&wire).unwrap();
        assert_eq!(packet.user_field(), 101);
        assert_eq!(packet.payload_type(), PayloadType::String);
        assert_eq!(packet.payload().as_ref(), payload);
        assert_eq!(packet.fragmentation_flag(), UNFRAGED);
    }

    #[test]
    fn test_wire_layout() {
        let wire = encode(b"ab", FRAGED, PayloadType::Bytes, 0x2A).unwrap();

        // total_length = 12 → (12 << 4) | 1 = 0xC1
        assert_eq!(
            wire.as_ref(),
            &[0xC1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x2A, b'a', b'b']
        );
    }

    #[test]
    fn test_roundtrip_across_lengths_flags_types_and_commands() {
        let lengths = [0usize, 1, 2, 7, 8, 63, 255, 512, 1000, MAX_PAYLOAD];
        for (i, &len) in lengths.iter().enumerate() {
            let payload: Vec<u8> = (0..len).map(|b| (b * 31 + i) as u8).collect();
            for flag in 0..=15u8 {
                let payload_type = ALL_TYPES[(flag as usize + i) % ALL_TYPES.len()];
                let command_id = (flag as usize * 17 + len) as u8;

                let wire = encode(&payload, flag, payload_type, command_id).unwrap();
                let packet = decode(&wire).unwrap();

                assert_eq!(packet.payload().as_ref(), payload.as_slice());
                assert_eq!(packet.user_field(), command_id);
                assert_eq!(packet.payload_type(), payload_type);
                assert_eq!(packet.fragmentation_flag(), flag);
            }
        }
    }

    #[test]
    fn test_every_command_id_survives() {
        for command_id in 0..=255u8 {
            let wire = encode(b"x", UNFRAGED, PayloadType::String, command_id).unwrap();
            assert_eq!(decode(&wire).unwrap().user_field(), command_id);
        }
    }

    #[test]
    fn test_max_frame_accepted() {
        let payload = vec![0xAB; MAX_PAYLOAD];
        let wire = encode(&payload, UNFRAGED, PayloadType::Bytes, 1).unwrap();
        assert_eq!(wire.len(), MAX_FRAME_LEN);
        assert_eq!(Header::parse(&wire).unwrap().total_length(), 1024);
    }

    #[test]
    fn test_one_byte_over_max_rejected() {
        let payload = vec![0xAB; MAX_PAYLOAD + 1];
        let err = encode(&payload, UNFRAGED, PayloadType::Bytes, 1).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge {
                size: 1015,
                max: 1014
            }
        ));
    }

    #[test]
    fn test_encode_into_leaves_buffer_untouched_on_error() {
        let mut dst = BytesMut::from(&b"prefix"[..]);
        let payload = vec![0u8; 4096];
        assert!(encode_into(&payload, UNFRAGED, PayloadType::Bytes, 1, &mut dst).is_err());
        assert_eq!(dst.as_ref(), b"prefix");
    }

    #[test]
    fn test_flag_is_masked_to_four_bits() {
        let wire = encode(b"", 0xF3, PayloadType::None, 4).unwrap();
        let header = Header::parse(&wire).unwrap();
        assert_eq!(header.fragmentation_flag(), 0x3);
        assert_eq!(header.total_length(), MIN_FRAME_LEN as u64);
    }

    #[test]
    fn test_reserved_bits_are_zero() {
        let wire = encode(&[0xFF; MAX_PAYLOAD], 0xF, PayloadType::Bytes, 0xFF).unwrap();
        assert_eq!(wire[6] & 0xFE, 0);
        assert_eq!(wire[7], 0);
    }

    #[test]
    fn test_decode_too_short() {
        let err = decode(&[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooShort { len: 3 }));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let wire = encode(b"hello", UNFRAGED, PayloadType::String, 1).unwrap();

        let err = decode(&wire[..wire.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidLength {
                declared: 15,
                actual: 14
            }
        ));

        let mut padded = wire.to_vec();
        padded.push(0);
        let err = decode(&padded).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { actual: 16, .. }));
    }

    #[test]
    fn test_decode_header_without_metadata() {
        let header = Header::new(HEADER_SIZE as u64, UNFRAGED).to_bytes();
        let err = decode(&header).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_oversized_declared_length() {
        let mut frame = Header::new(2048, UNFRAGED).to_bytes().to_vec();
        frame.resize(2048, 0);
        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_unknown_payload_type() {
        let mut wire = encode(b"data", UNFRAGED, PayloadType::String, 1)
            .unwrap()
            .to_vec();
        wire[HEADER_SIZE] = 0xEE;
        let err = decode(&wire).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(msg) if msg.contains("0xee")));
    }

    #[test]
    fn test_empty_payload() {
        let wire = encode(b"", UNFRAGED, PayloadType::None, 4).unwrap();
        let packet = decode(&wire).unwrap();
        assert_eq!(packet.user_field(), 4);
        assert!(packet.payload().is_empty());
        assert_eq!(packet.payload_type(), PayloadType::None);
    }

    #[test]
    fn test_header_valid_length_bounds() {
        assert!(!Header::new(4, UNFRAGED).is_valid_length());
        assert!(!Header::new(7, UNFRAGED).is_valid_length());
        assert!(Header::new(8, UNFRAGED).is_valid_length());
        assert!(Header::new(1024, UNFRAGED).is_valid_length());
        assert!(!Header::new(1025, UNFRAGED).is_valid_length());
    }

    #[test]
    fn test_header_bytes_roundtrip() {
        let header = Header::new(0x1234, 0x9);
        assert_eq!(Header::parse(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_decode_bytes_shares_buffer() {
        let wire = encode(b"zero-copy", UNFRAGED, PayloadType::String, 7).unwrap();
        let packet = decode_bytes(wire.clone()).unwrap();
        assert_eq!(packet.payload().as_ref(), b"zero-copy");
        assert_eq!(packet.payload().as_ptr(), wire[MIN_FRAME_LEN..].as_ptr());
    }

    #[test]
    fn test_packet_wire_size() {
        let packet = ParsedPacket::new(1, PayloadType::String, Bytes::from_static(b"test"));
        assert_eq!(packet.wire_size(), MIN_FRAME_LEN + 4);
    }

    #[test]
    fn test_payload_type_from_byte() {
        for payload_type in ALL_TYPES {
            assert_eq!(
                PayloadType::try_from(payload_type.as_u8()).unwrap(),
                payload_type
            );
        }
        assert!(PayloadType::try_from(0x07).is_err());
    }
}
