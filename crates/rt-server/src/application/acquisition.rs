//! Trait seam for the external acquisition collaborator.
//!
//! The server core never talks to hardware.  It pulls the measurement info
//! header through this trait and pushes configuration changes back; blocks
//! flow in the other direction through [`crate::server::RtServer::publish`].

#[cfg(test)]
use mockall::automock;

use fiff_stream::InfoHeader;

/// Pull interface onto the acquisition source.
///
/// Infrastructure implementations wrap a device driver or simulator; test
/// implementations are mocked.
#[cfg_attr(test, automock)]
pub trait AcquisitionSource: Send + Sync {
    /// Returns the current measurement info header, or `None` while the
    /// source is not ready (no measurement configured yet).
    fn info_header(&self) -> Option<InfoHeader>;

    /// Reconfigures the block size (samples per measurement block).
    ///
    /// The caller guarantees no session is streaming while this runs; the
    /// source only validates against its own hardware limits.
    fn set_buffer_size(&self, samples: u32) -> Result<(), String>;
}
