//! Domain entities for the rt-stream server.
//!
//! Pure acquisition-side types with no infrastructure dependencies: the
//! measurement info header negotiated before streaming, and the opaque
//! measurement block payload the server forwards to subscribed clients.

pub mod block;
pub mod info;
