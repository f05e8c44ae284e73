//! # fiff-stream
//!
//! Shared library for the rt-stream real-time measurement server, containing
//! the wire protocol codec, domain entities, and client-id allocation.
//!
//! This crate is used by both the server and client applications.
//! It has zero dependencies on OS APIs or network sockets.
//!
//! The protocol is the "Fiff stream" protocol: clients send fixed-size binary
//! command frames (request info, start/stop measurement, set buffer size,
//! disconnect), and the server answers with length-prefixed frames carrying
//! an info header, status responses, and – once a client is streaming – a
//! continuous sequence of measurement blocks.
//!
//! - **`protocol`** – How bytes travel over the wire.  Command frames are a
//!   fixed 5 bytes; server frames carry a one-byte type tag and a 4-byte
//!   length prefix.  All integers are big-endian.
//!
//! - **`domain`** – Pure acquisition-side entities: the [`InfoHeader`]
//!   describing the measurement (channel table, sampling rate, block size)
//!   and the opaque [`MeasurementBlock`] payload the server fans out.

pub mod domain;
pub mod protocol;

pub use domain::block::MeasurementBlock;
pub use domain::info::{ChannelInfo, ChannelKind, InfoHeader};
pub use protocol::client_id::{ClientId, ClientIdCounter};
pub use protocol::codec::{decode_command, decode_frame, encode_command, encode_frame, ProtocolError};
pub use protocol::commands::{
    Command, CommandCode, Frame, FrameType, StatusCode, COMMAND_FRAME_SIZE, FRAME_HEADER_SIZE,
};
