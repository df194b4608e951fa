use crate::types::{Arrow, DetectionKind, DetectionRecord};
use crate::{ProtocolError, Result};

// -- Packet geometry --
/// Fixed header: magic (0x55 0xAA), protocol address 0x11, reserved 0x00.
pub const HEADER: [u8; 4] = [0x55, 0xAA, 0x11, 0x00];
/// Bytes around the payload: header + command + length + checksum.
pub const FRAME_OVERHEAD: usize = HEADER.len() + 3;
/// Offset of the length byte; the payload starts right after it.
const LENGTH_OFFSET: usize = HEADER.len() + 1;
/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

// -- Block sub-records --
pub const FRAME_MARKER: [u8; 2] = [0x55, 0xAA];
/// [marker:2][id:2][x:2][y:2][w:2][h:2], little-endian u16 fields.
pub const BLOCK_RECORD_LEN: usize = 12;

/// One-byte opcodes understood by the sensor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Request = 0x20,
    RequestBlocks = 0x21,
    RequestArrows = 0x22,
    RequestLearned = 0x23,
    RequestBlocksLearned = 0x24,
    RequestArrowsLearned = 0x25,
    RequestById = 0x26,
    ReturnInfo = 0x29,
    ReturnBlock = 0x2A,
    ReturnArrow = 0x2B,
    Knock = 0x2C,
    Algorithm = 0x2D,
    ReturnOk = 0x2E,
    Learn = 0x36,
    Forget = 0x37,
}

impl Command {
    const ALL: [Command; 15] = [
        Command::Request,
        Command::RequestBlocks,
        Command::RequestArrows,
        Command::RequestLearned,
        Command::RequestBlocksLearned,
        Command::RequestArrowsLearned,
        Command::RequestById,
        Command::ReturnInfo,
        Command::ReturnBlock,
        Command::ReturnArrow,
        Command::Knock,
        Command::Algorithm,
        Command::ReturnOk,
        Command::Learn,
        Command::Forget,
    ];

    /// Opcode as sent on the wire.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_byte() == byte)
            .ok_or(ProtocolError::UnknownCommand(byte))
    }
}

/// A validated frame with the header and checksum stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: Command,
    pub payload: Vec<u8>,
}

/// Modulo-256 sum of every byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build a frame: [header][command][len][payload...][checksum].
pub fn encode(command: Command, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::MalformedPayload(format!(
            "payload of {} bytes exceeds {}",
            payload.len(),
            MAX_PAYLOAD
        )));
    }
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.extend_from_slice(&HEADER);
    buf.push(command.as_byte());
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Validate a complete reply frame and split out command and payload.
///
/// The checksum is verified before anything else is interpreted, so a
/// corrupted byte anywhere in the frame reports `ChecksumMismatch` rather than
/// a structural error. Anything shorter than a frame with an empty payload is
/// `Truncated`.
pub fn decode(raw: &[u8]) -> Result<Packet> {
    if raw.len() < FRAME_OVERHEAD {
        return Err(ProtocolError::Truncated { len: raw.len() });
    }

    let (body, trailer) = raw.split_at(raw.len() - 1);
    let expected = checksum(body);
    if trailer[0] != expected {
        return Err(ProtocolError::ChecksumMismatch {
            expected,
            actual: trailer[0],
        });
    }

    if body[..HEADER.len()] != HEADER {
        return Err(ProtocolError::MalformedPayload(format!(
            "bad header {:02x?}",
            &body[..HEADER.len()]
        )));
    }

    let declared = body[LENGTH_OFFSET] as usize;
    let payload = &body[LENGTH_OFFSET + 1..];
    if payload.len() != declared {
        return Err(ProtocolError::MalformedPayload(format!(
            "length byte says {} but {} payload bytes present",
            declared,
            payload.len()
        )));
    }

    let command = Command::try_from(body[HEADER.len()])?;
    Ok(Packet {
        command,
        payload: payload.to_vec(),
    })
}

/// Total length of the frame starting at `buf[0]`, once the length byte has
/// arrived. Returns `None` until the length byte is buffered.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    buf.get(LENGTH_OFFSET).map(|&len| FRAME_OVERHEAD + len as usize)
}

/// Interprets validated reply payloads as domain records.
///
/// The client only talks to this trait, so swapping in an exact vendor layout
/// does not touch the client or the tracker.
pub trait ReplyDecoder {
    fn decode_blocks(&self, kind: DetectionKind, payload: &[u8]) -> Result<Vec<DetectionRecord>>;

    fn decode_arrows(&self, payload: &[u8]) -> Result<Vec<Arrow>>;
}

/// Best-effort layout: scan the payload for `55 AA` markers and read one
/// fixed-width block after each.
///
/// Arrow replies are not decoded yet; `decode_arrows` always returns an empty
/// list until the device's arrow layout is pinned down.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerScan;

impl ReplyDecoder for MarkerScan {
    fn decode_blocks(&self, kind: DetectionKind, payload: &[u8]) -> Result<Vec<DetectionRecord>> {
        let mut records = Vec::new();
        let mut i = 0;

        while i + BLOCK_RECORD_LEN <= payload.len() {
            if payload[i..i + 2] != FRAME_MARKER {
                i += 1;
                continue;
            }

            let field = |offset: usize| {
                u16::from_le_bytes([payload[i + offset], payload[i + offset + 1]]) as u32
            };
            let id = field(2);
            let mut record = DetectionRecord::new(kind, field(4), field(6), field(8), field(10));
            // id 0 = not learned
            if id != 0 {
                record.identity = Some(id);
            }
            records.push(record);
            i += BLOCK_RECORD_LEN;
        }

        Ok(records)
    }

    fn decode_arrows(&self, _payload: &[u8]) -> Result<Vec<Arrow>> {
        Ok(Vec::new())
    }
}

/// Encode one block sub-record in the `MarkerScan` layout.
pub fn encode_block(identity: u16, x: u16, y: u16, width: u16, height: u16) -> [u8; BLOCK_RECORD_LEN] {
    let mut buf = [0u8; BLOCK_RECORD_LEN];
    buf[0..2].copy_from_slice(&FRAME_MARKER);
    buf[2..4].copy_from_slice(&identity.to_le_bytes());
    buf[4..6].copy_from_slice(&x.to_le_bytes());
    buf[6..8].copy_from_slice(&y.to_le_bytes());
    buf[8..10].copy_from_slice(&width.to_le_bytes());
    buf[10..12].copy_from_slice(&height.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let buf = encode(Command::Algorithm, &[0x03]).unwrap();
        assert_eq!(&buf[..4], &HEADER);
        assert_eq!(buf[4], 0x2D);
        assert_eq!(buf[5], 1);
        assert_eq!(buf[6], 0x03);
        // 0x55+0xAA+0x11+0x00+0x2D+0x01+0x03 = 0x141
        assert_eq!(buf[7], 0x41);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_encode_empty_payload() {
        let buf = encode(Command::RequestBlocks, &[]).unwrap();
        assert_eq!(buf, vec![0x55, 0xAA, 0x11, 0x00, 0x21, 0x00, 0x31]);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; 256];
        assert!(matches!(
            encode(Command::Learn, &payload),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_round_trip() {
        let payloads: [&[u8]; 4] = [&[], &[0x00], &[0xFF, 0x10, 0x7E], &[0xAB; 255]];
        for payload in payloads {
            let buf = encode(Command::ReturnBlock, payload).unwrap();
            let packet = decode(&buf).unwrap();
            assert_eq!(packet.command, Command::ReturnBlock);
            assert_eq!(packet.payload, payload);
        }
    }

    #[test]
    fn test_single_bit_flip_is_checksum_mismatch() {
        let buf = encode(Command::ReturnInfo, &[0x01, 0x02, 0x80, 0xFE]).unwrap();
        for byte in 0..buf.len() {
            for bit in 0..8 {
                let mut corrupted = buf.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    matches!(decode(&corrupted), Err(ProtocolError::ChecksumMismatch { .. })),
                    "byte {} bit {} not detected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_short_prefix_is_truncated() {
        let buf = encode(Command::ReturnOk, &[0x09, 0x08]).unwrap();
        for len in 0..FRAME_OVERHEAD {
            assert!(matches!(
                decode(&buf[..len]),
                Err(ProtocolError::Truncated { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn test_bad_header_is_malformed() {
        let mut buf = vec![0x55, 0xAB, 0x11, 0x00, 0x2E, 0x00];
        buf.push(checksum(&buf));
        assert!(matches!(decode(&buf), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_length_mismatch_is_malformed() {
        let mut buf = vec![0x55, 0xAA, 0x11, 0x00, 0x2E, 0x03, 0x01];
        buf.push(checksum(&buf));
        assert!(matches!(decode(&buf), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_unknown_command() {
        let mut buf = vec![0x55, 0xAA, 0x11, 0x00, 0x99, 0x00];
        buf.push(checksum(&buf));
        assert!(matches!(decode(&buf), Err(ProtocolError::UnknownCommand(0x99))));
    }

    #[test]
    fn test_frame_len() {
        let buf = encode(Command::ReturnBlock, &[1, 2, 3]).unwrap();
        assert_eq!(frame_len(&buf[..5]), None);
        assert_eq!(frame_len(&buf[..6]), Some(10));
        assert_eq!(frame_len(&buf), Some(buf.len()));
        assert_eq!(buf.len(), FRAME_OVERHEAD + 3);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let buf = encode(Command::ReturnOk, &[]).unwrap();
        assert_eq!(buf.len(), FRAME_OVERHEAD);
        assert_eq!(frame_len(&buf), Some(FRAME_OVERHEAD));
        let packet = decode(&buf).unwrap();
        assert_eq!(packet.command, Command::ReturnOk);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_six_byte_frame_with_valid_checksum_is_truncated() {
        let raw = [0x55, 0xAA, 0x11, 0x00, 0x2E, 0x3E];
        assert_eq!(checksum(&raw[..5]), raw[5]);
        assert!(matches!(decode(&raw), Err(ProtocolError::Truncated { len: 6 })));
    }

    #[test]
    fn test_marker_scan_blocks() {
        let mut payload = vec![0x00, 0x13];
        payload.extend_from_slice(&encode_block(0, 10, 20, 30, 40));
        payload.push(0x42);
        payload.extend_from_slice(&encode_block(7, 300, 50, 20, 20));

        let records = MarkerScan.decode_blocks(DetectionKind::Tag, &payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], DetectionRecord::new(DetectionKind::Tag, 10, 20, 30, 40));
        assert_eq!(records[1].x, 300);
        assert_eq!(records[1].identity, Some(7));
    }

    #[test]
    fn test_marker_scan_ignores_partial_trailing_block() {
        let mut payload = encode_block(0, 1, 2, 3, 4).to_vec();
        payload.extend_from_slice(&encode_block(0, 5, 6, 7, 8)[..BLOCK_RECORD_LEN - 1]);
        let records = MarkerScan.decode_blocks(DetectionKind::Object, &payload).unwrap();
        assert_eq!(records.len(), 1);
        assert!(MarkerScan.decode_blocks(DetectionKind::Object, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_arrows_are_not_decoded() {
        let payload = encode_block(0, 1, 2, 3, 4);
        assert!(MarkerScan.decode_arrows(&payload).unwrap().is_empty());
    }
}
