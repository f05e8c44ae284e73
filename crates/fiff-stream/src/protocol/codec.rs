//! Binary codec for encoding and decoding Fiff stream protocol frames.
//!
//! Wire format, client → server (fixed 5 bytes per command):
//! ```text
//! [code:1][arg:4]
//! ```
//!
//! Wire format, server → client (length-prefixed frames):
//! ```text
//! [frame_type:1][payload_len:4][payload:N]
//! ```
//! All multi-byte integers are big-endian.  Commands with no argument send
//! `arg = 0`; the argument of an unrecognized code is preserved so the
//! session can report what it refused.

use thiserror::Error;

use crate::domain::block::MeasurementBlock;
use crate::domain::info::{ChannelInfo, ChannelKind, InfoHeader};
use crate::protocol::commands::{
    Command, CommandCode, Frame, FrameType, StatusCode, COMMAND_FRAME_SIZE, FRAME_HEADER_SIZE,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame type byte in the header is not a recognized value.
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Command frames (client → server) ──────────────────────────────────────────

/// Encodes a [`Command`] into its fixed 5-byte wire form.
///
/// # Examples
///
/// ```rust
/// use fiff_stream::protocol::codec::{decode_command, encode_command};
/// use fiff_stream::protocol::commands::{Command, CommandCode};
///
/// let cmd = Command::new(CommandCode::SetBufferSize, 500);
/// let bytes = encode_command(&cmd);
/// assert_eq!(decode_command(&bytes).unwrap(), cmd);
/// ```
pub fn encode_command(cmd: &Command) -> [u8; COMMAND_FRAME_SIZE] {
    let mut buf = [0u8; COMMAND_FRAME_SIZE];
    buf[0] = cmd.raw_code;
    buf[1..5].copy_from_slice(&cmd.arg.to_be_bytes());
    buf
}

/// Decodes one [`Command`] from exactly [`COMMAND_FRAME_SIZE`] bytes.
///
/// This is a pure decode: an unrecognized code byte yields the UNKNOWN
/// command rather than an error, so a malformed instruction can be reported
/// back to the client without tearing the session down.  Only a short buffer
/// is an error, because the session reads exact-size command frames.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than 5 bytes are given.
pub fn decode_command(bytes: &[u8]) -> Result<Command, ProtocolError> {
    if bytes.len() < COMMAND_FRAME_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: COMMAND_FRAME_SIZE,
            available: bytes.len(),
        });
    }

    let raw_code = bytes[0];
    let arg = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);

    Ok(match CommandCode::try_from(raw_code) {
        Ok(kind) => Command::new(kind, arg),
        Err(()) => Command::unknown(raw_code, arg),
    })
}

// ── Server frames (server → client) ───────────────────────────────────────────

/// Encodes a [`Frame`] into a byte vector including the 5-byte header.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let payload = encode_payload(frame);

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(frame.frame_type() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// Returns the decoded frame and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let type_byte = bytes[0];
    let frame_type =
        FrameType::try_from(type_byte).map_err(|_| ProtocolError::UnknownFrameType(type_byte))?;

    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    let total_needed = FRAME_HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - FRAME_HEADER_SIZE,
        });
    }

    let payload = &bytes[FRAME_HEADER_SIZE..total_needed];
    let frame = decode_payload(frame_type, payload)?;
    Ok((frame, total_needed))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::new();
    match frame {
        Frame::InfoHeader(h) => encode_info_header(&mut buf, h),
        Frame::Status { code, message } => {
            buf.push(*code as u8);
            write_length_prefixed_string(&mut buf, message);
        }
        Frame::MeasurementBlock(b) => {
            buf.extend_from_slice(&b.sequence.to_be_bytes());
            buf.extend_from_slice(&b.sample_count.to_be_bytes());
            buf.extend_from_slice(&b.data);
        }
    }
    buf
}

fn encode_info_header(buf: &mut Vec<u8>, h: &InfoHeader) {
    buf.extend_from_slice(&h.channel_count.to_be_bytes());
    buf.extend_from_slice(&h.sampling_rate.to_be_bytes());
    buf.extend_from_slice(&h.buffer_size.to_be_bytes());
    write_length_prefixed_string(buf, &h.measurement_id);
    for channel in &h.channels {
        buf.push(channel.kind as u8);
        write_length_prefixed_string(buf, &channel.name);
    }
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(frame_type: FrameType, payload: &[u8]) -> Result<Frame, ProtocolError> {
    match frame_type {
        FrameType::InfoHeader => decode_info_header(payload).map(Frame::InfoHeader),
        FrameType::Status => {
            require_len(payload, 1, "Status")?;
            let code = StatusCode::try_from(payload[0]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown status code: {}", payload[0]))
            })?;
            let (message, _) = read_length_prefixed_string(payload, 1)?;
            Ok(Frame::Status { code, message })
        }
        FrameType::MeasurementBlock => {
            // 8 (sequence) + 4 (sample_count), data may be empty
            require_len(payload, 12, "MeasurementBlock")?;
            let sequence = read_u64(payload, 0)?;
            let sample_count =
                u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]);
            Ok(Frame::MeasurementBlock(MeasurementBlock::new(
                sequence,
                sample_count,
                payload[12..].to_vec(),
            )))
        }
    }
}

fn decode_info_header(p: &[u8]) -> Result<InfoHeader, ProtocolError> {
    // 4 (channel_count) + 4 (sampling_rate) + 4 (buffer_size) + 2 (id len) >= 14
    require_len(p, 14, "InfoHeader")?;
    let channel_count = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let sampling_rate = f32::from_be_bytes([p[4], p[5], p[6], p[7]]);
    let buffer_size = u32::from_be_bytes([p[8], p[9], p[10], p[11]]);
    let (measurement_id, mut off) = read_length_prefixed_string(p, 12)?;

    let mut channels = Vec::with_capacity(channel_count as usize);
    for _ in 0..channel_count {
        require_len(p, off + 1, "InfoHeader channel kind")?;
        let kind = ChannelKind::try_from(p[off]).map_err(|_| {
            ProtocolError::MalformedPayload(format!("unknown channel kind: {}", p[off]))
        })?;
        let (name, next) = read_length_prefixed_string(p, off + 1)?;
        channels.push(ChannelInfo { name, kind });
        off = next;
    }

    Ok(InfoHeader {
        channel_count,
        sampling_rate,
        buffer_size,
        measurement_id,
        channels,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    if buf.len() < offset + 8 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        });
    }
    Ok(u64::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
        buf[offset + 5],
        buf[offset + 6],
        buf[offset + 7],
    ]))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(frame: &Frame) -> Frame {
        let encoded = encode_frame(frame);
        let (decoded, consumed) = decode_frame(&encoded).expect("decode failed");
        assert_eq!(
            consumed,
            encoded.len(),
            "consumed bytes should equal total encoded size"
        );
        decoded
    }

    fn sample_header() -> InfoHeader {
        InfoHeader {
            channel_count: 3,
            sampling_rate: 600.614_8,
            buffer_size: 500,
            measurement_id: "neuromag-sim".to_string(),
            channels: vec![
                ChannelInfo {
                    name: "MEG 0113".to_string(),
                    kind: ChannelKind::Meg,
                },
                ChannelInfo {
                    name: "EEG 001".to_string(),
                    kind: ChannelKind::Eeg,
                },
                ChannelInfo {
                    name: "STI 014".to_string(),
                    kind: ChannelKind::Stim,
                },
            ],
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    #[test]
    fn test_command_round_trip_all_codes() {
        for (code, arg) in [
            (CommandCode::RequestInfo, 0),
            (CommandCode::StartMeasurement, 0),
            (CommandCode::StopMeasurement, 0),
            (CommandCode::SetBufferSize, 1000),
            (CommandCode::Disconnect, 0),
        ] {
            let cmd = Command::new(code, arg);
            let decoded = decode_command(&encode_command(&cmd)).unwrap();
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn test_decode_command_unrecognized_code_maps_to_unknown() {
        let decoded = decode_command(&[0xAB, 0x00, 0x00, 0x01, 0x02]).unwrap();
        assert!(!decoded.is_known());
        assert_eq!(decoded.raw_code, 0xAB);
        assert_eq!(decoded.arg, 0x0102);
    }

    #[test]
    fn test_decode_command_arg_is_big_endian() {
        let decoded = decode_command(&[0x04, 0x00, 0x00, 0x01, 0xF4]).unwrap();
        assert_eq!(decoded.kind, Some(CommandCode::SetBufferSize));
        assert_eq!(decoded.arg, 500);
    }

    #[test]
    fn test_decode_command_short_buffer_returns_insufficient_data() {
        let result = decode_command(&[0x01, 0x00]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    // ── InfoHeader ───────────────────────────────────────────────────────────

    #[test]
    fn test_info_header_round_trip() {
        let frame = Frame::InfoHeader(sample_header());
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_info_header_with_no_channels_round_trip() {
        let frame = Frame::InfoHeader(InfoHeader {
            channel_count: 0,
            sampling_rate: 1000.0,
            buffer_size: 32,
            measurement_id: String::new(),
            channels: vec![],
        });
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_info_header_truncated_channel_table_is_malformed() {
        let mut bytes = encode_frame(&Frame::InfoHeader(sample_header()));
        // Chop off the last channel entry but leave the declared count alone.
        let new_payload_len = (bytes.len() - FRAME_HEADER_SIZE - 10) as u32;
        bytes.truncate(bytes.len() - 10);
        bytes[1..5].copy_from_slice(&new_payload_len.to_be_bytes());
        let result = decode_frame(&bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Status ───────────────────────────────────────────────────────────────

    #[test]
    fn test_status_ok_round_trip() {
        let frame = Frame::ok("measurement started");
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_status_rejected_round_trip() {
        let frame = Frame::error(StatusCode::Rejected, "buffer size locked while streaming");
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_status_with_empty_message_round_trip() {
        let frame = Frame::error(StatusCode::NotReady, "");
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_status_unknown_code_byte_is_malformed() {
        let mut bytes = encode_frame(&Frame::ok("x"));
        bytes[FRAME_HEADER_SIZE] = 0x77;
        let result = decode_frame(&bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── MeasurementBlock ─────────────────────────────────────────────────────

    #[test]
    fn test_measurement_block_round_trip() {
        let frame = Frame::MeasurementBlock(MeasurementBlock::new(
            42,
            100,
            (0u16..400).flat_map(|v| v.to_be_bytes()).collect(),
        ));
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_measurement_block_empty_payload_round_trip() {
        let frame = Frame::MeasurementBlock(MeasurementBlock::new(0, 0, vec![]));
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn test_measurement_block_preserves_sequence_number() {
        let frame =
            Frame::MeasurementBlock(MeasurementBlock::new(u64::MAX, 1, vec![0xAA, 0xBB]));
        if let Frame::MeasurementBlock(b) = round_trip(&frame) {
            assert_eq!(b.sequence, u64::MAX);
            assert_eq!(b.sample_count, 1);
            assert_eq!(&b.data[..], &[0xAA, 0xBB]);
        } else {
            panic!("decoded frame has wrong type");
        }
    }

    #[test]
    fn test_measurement_block_truncated_header_is_malformed() {
        // Declares 4 payload bytes, which is less than sequence + sample_count.
        let bytes = [0x03, 0x00, 0x00, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04];
        let result = decode_frame(&bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Frame-level error conditions ─────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_frame(&[]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_unknown_frame_type_returns_error() {
        let bytes = [0xEE, 0x00, 0x00, 0x00, 0x00];
        let result = decode_frame(&bytes);
        assert!(matches!(result, Err(ProtocolError::UnknownFrameType(0xEE))));
    }

    #[test]
    fn test_decode_payload_length_exceeds_available_returns_error() {
        let mut bytes = encode_frame(&Frame::ok("hello"));
        // Declare more payload than is present.
        bytes[1..5].copy_from_slice(&1000u32.to_be_bytes());
        let result = decode_frame(&bytes);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_consumes_exactly_one_frame() {
        let first = encode_frame(&Frame::ok("a"));
        let second = encode_frame(&Frame::error(StatusCode::Unknown, "b"));
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let (frame, consumed) = decode_frame(&stream).unwrap();
        assert_eq!(frame, Frame::ok("a"));
        assert_eq!(consumed, first.len());

        let (frame2, _) = decode_frame(&stream[consumed..]).unwrap();
        assert_eq!(frame2, Frame::error(StatusCode::Unknown, "b"));
    }
}
