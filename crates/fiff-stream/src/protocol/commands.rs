//! All Fiff stream protocol command and frame types.
//!
//! Requests travel client → server as fixed-size command frames; everything
//! the server sends back – info headers, status responses, measurement
//! blocks – travels as a length-prefixed [`Frame`].

use serde::{Deserialize, Serialize};

use crate::domain::block::MeasurementBlock;
use crate::domain::info::InfoHeader;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of a client command frame in bytes: `[code:1][arg:4]`.
pub const COMMAND_FRAME_SIZE: usize = 5;

/// Size of a server frame header in bytes: `[frame_type:1][payload_len:4]`.
pub const FRAME_HEADER_SIZE: usize = 5;

// ── Command codes ─────────────────────────────────────────────────────────────

/// Command codes a client may send.
///
/// Codes outside this set decode to [`Command::unknown`] – the parser fails
/// closed rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandCode {
    /// Request the serialized measurement info header.
    RequestInfo = 0x01,
    /// Begin streaming measurement blocks to this client.
    StartMeasurement = 0x02,
    /// Stop streaming measurement blocks to this client.
    StopMeasurement = 0x03,
    /// Reconfigure the acquisition block size (argument = samples per block).
    SetBufferSize = 0x04,
    /// Close this client's session.
    Disconnect = 0x05,
}

impl TryFrom<u8> for CommandCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(CommandCode::RequestInfo),
            0x02 => Ok(CommandCode::StartMeasurement),
            0x03 => Ok(CommandCode::StopMeasurement),
            0x04 => Ok(CommandCode::SetBufferSize),
            0x05 => Ok(CommandCode::Disconnect),
            _ => Err(()),
        }
    }
}

// ── Parsed commands ───────────────────────────────────────────────────────────

/// A parsed client instruction.
///
/// `kind` is `None` for unrecognized command codes; the raw byte is kept in
/// `raw_code` so the rejection response can name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Recognized command, or `None` for an unknown code.
    pub kind: Option<CommandCode>,
    /// The code byte exactly as received.
    pub raw_code: u8,
    /// 4-byte argument; zero for commands that take none.
    pub arg: u32,
}

impl Command {
    /// Builds a well-formed command.
    pub fn new(kind: CommandCode, arg: u32) -> Self {
        Self {
            kind: Some(kind),
            raw_code: kind as u8,
            arg,
        }
    }

    /// Builds the UNKNOWN command for an unrecognized code byte.
    pub fn unknown(raw_code: u8, arg: u32) -> Self {
        Self {
            kind: None,
            raw_code,
            arg,
        }
    }

    /// Returns `true` when the code byte was recognized.
    pub fn is_known(&self) -> bool {
        self.kind.is_some()
    }
}

// ── Server frame types ────────────────────────────────────────────────────────

/// Frame type codes for server → client frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Serialized measurement info header.
    InfoHeader = 0x01,
    /// Plain status / error response.
    Status = 0x02,
    /// One opaque measurement block.
    MeasurementBlock = 0x03,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(FrameType::InfoHeader),
            0x02 => Ok(FrameType::Status),
            0x03 => Ok(FrameType::MeasurementBlock),
            _ => Err(()),
        }
    }
}

/// Status codes carried by a [`Frame::Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    /// Command executed.
    Ok = 0x00,
    /// The acquisition source has no info header yet.
    NotReady = 0x01,
    /// Command understood but refused (e.g. reconfiguration while streaming).
    Rejected = 0x02,
    /// The command code was not recognized.
    Unknown = 0x03,
}

impl TryFrom<u8> for StatusCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(StatusCode::Ok),
            0x01 => Ok(StatusCode::NotReady),
            0x02 => Ok(StatusCode::Rejected),
            0x03 => Ok(StatusCode::Unknown),
            _ => Err(()),
        }
    }
}

// ── Top-level frame enum ──────────────────────────────────────────────────────

/// All valid server → client frames, discriminated by type.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Measurement info header (reply to REQUEST_INFO; stream preamble).
    InfoHeader(InfoHeader),
    /// Status or error response to a command.
    Status {
        code: StatusCode,
        message: String,
    },
    /// One measurement block, forwarded uninterpreted.
    MeasurementBlock(MeasurementBlock),
}

impl Frame {
    /// Returns the [`FrameType`] discriminant for this frame.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::InfoHeader(_) => FrameType::InfoHeader,
            Frame::Status { .. } => FrameType::Status,
            Frame::MeasurementBlock(_) => FrameType::MeasurementBlock,
        }
    }

    /// Shorthand for an `Ok` status frame.
    pub fn ok(message: impl Into<String>) -> Self {
        Frame::Status {
            code: StatusCode::Ok,
            message: message.into(),
        }
    }

    /// Shorthand for a non-`Ok` status frame.
    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        Frame::Status {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_round_trips_through_u8() {
        for code in [
            CommandCode::RequestInfo,
            CommandCode::StartMeasurement,
            CommandCode::StopMeasurement,
            CommandCode::SetBufferSize,
            CommandCode::Disconnect,
        ] {
            assert_eq!(CommandCode::try_from(code as u8), Ok(code));
        }
    }

    #[test]
    fn test_command_code_rejects_unassigned_bytes() {
        assert!(CommandCode::try_from(0x00).is_err());
        assert!(CommandCode::try_from(0x06).is_err());
        assert!(CommandCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_unknown_command_keeps_raw_code() {
        let cmd = Command::unknown(0x7F, 9);
        assert!(!cmd.is_known());
        assert_eq!(cmd.raw_code, 0x7F);
        assert_eq!(cmd.arg, 9);
    }

    #[test]
    fn test_frame_type_discriminants() {
        let status = Frame::ok("done");
        assert_eq!(status.frame_type(), FrameType::Status);

        let rejected = Frame::error(StatusCode::Rejected, "busy");
        assert!(matches!(
            rejected,
            Frame::Status {
                code: StatusCode::Rejected,
                ..
            }
        ));
    }
}
