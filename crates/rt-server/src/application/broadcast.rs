//! Measurement fan-out to streaming sessions.
//!
//! The acquisition producer calls [`StreamBroadcaster::on_block_available`]
//! once per produced block.  The whole enumerate-and-enqueue pass happens
//! under the registry lock, so a session cannot be torn down mid-pass, and
//! every streaming session sees blocks in production order.
//!
//! The enqueue is non-blocking: a slow client never stalls the producer.
//! On a full queue the block is dropped for that client; after
//! [`OVERFLOW_DISCONNECT_THRESHOLD`] consecutive overflows the client is
//! disconnected, because the wire protocol carries no backpressure signal
//! and an unbounded queue would grow without limit.

use std::sync::Arc;

use fiff_stream::{ClientId, Frame, MeasurementBlock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::application::registry::ClientRegistry;

/// Consecutive full-queue drops tolerated before a client is disconnected.
pub const OVERFLOW_DISCONNECT_THRESHOLD: u32 = 3;

/// Fans produced measurement blocks out to every streaming session.
///
/// Cheap to clone; the producer task holds its own copy.
#[derive(Clone)]
pub struct StreamBroadcaster {
    registry: Arc<ClientRegistry>,
}

impl StreamBroadcaster {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Push callback invoked for every newly produced block.
    ///
    /// Never blocks on a slow consumer and never mutates registry
    /// membership; overflowing sessions are only signalled to shut down and
    /// remove themselves.
    pub async fn on_block_available(&self, block: MeasurementBlock) {
        let mut clients = self.registry.guard().await;
        let mut to_disconnect: Vec<ClientId> = Vec::new();

        for (id, handle) in clients.iter_mut() {
            if !handle.is_streaming() {
                continue;
            }
            // The payload is behind an Arc, so this clones a pointer.
            match handle.try_send(Frame::MeasurementBlock(block.clone())) {
                Ok(()) => {
                    handle.consecutive_overflows = 0;
                }
                Err(TrySendError::Full(_)) => {
                    handle.consecutive_overflows += 1;
                    warn!(
                        client_id = *id,
                        sequence = block.sequence,
                        consecutive = handle.consecutive_overflows,
                        "streaming client too slow, block dropped"
                    );
                    if handle.consecutive_overflows >= OVERFLOW_DISCONNECT_THRESHOLD {
                        to_disconnect.push(*id);
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    // Session is already tearing down; it will remove itself.
                    debug!(client_id = *id, "skipped block for closing session");
                }
            }
        }

        for id in to_disconnect {
            if let Some(handle) = clients.get(&id) {
                info!(
                    client_id = id,
                    "disconnecting client after persistent overflow"
                );
                handle.signal_shutdown();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
