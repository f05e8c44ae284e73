//! Infrastructure layer: sockets, configuration storage, and the simulated
//! acquisition source.

pub mod acquisition;
pub mod network;
pub mod storage;
