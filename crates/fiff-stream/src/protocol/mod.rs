//! Protocol module containing command/frame types and the binary codec.

pub mod client_id;
pub mod codec;
pub mod commands;

pub use client_id::{ClientId, ClientIdCounter};
pub use codec::{decode_command, decode_frame, encode_command, encode_frame, ProtocolError};
pub use commands::*;
