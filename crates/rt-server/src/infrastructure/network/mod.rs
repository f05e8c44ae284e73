//! TCP infrastructure: the accept loop and per-client session I/O.

pub mod listener;
pub mod session;
