//! rt-client library entry point.
//!
//! [`RtClient`] is a blocking-style async wrapper over one TCP connection to
//! the streaming server: commands out, frames in, strictly in order.

pub mod connection;

pub use connection::{ClientError, RtClient};
