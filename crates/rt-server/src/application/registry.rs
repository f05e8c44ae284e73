//! Client registry: the server's in-memory map of every live session.
//!
//! Each entry is a [`SessionHandle`]: the control surface the rest of the
//! server holds onto a running session task.  The session itself owns the
//! socket; the handle owns the outbound queue sender, the streaming flag,
//! and the shutdown signal.
//!
//! # Lock discipline
//!
//! One async mutex guards the whole map.  The listener's insert, each
//! session's teardown removal, the broadcaster's enumerate-and-enqueue pass,
//! and the dispatcher's "is anyone streaming?" check all take this single
//! lock, so a session can never be torn down in the middle of a fan-out
//! pass.  The registry is an owned object shared by `Arc`, never a global.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fiff_stream::{ClientId, Frame};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::debug;

/// Control surface for one running session task.
pub struct SessionHandle {
    /// Process-unique client id.
    pub id: ClientId,
    /// Peer address, for logging.
    pub peer: SocketAddr,
    /// Whether the session is in streaming mode.  Set by the dispatcher,
    /// read by the broadcaster under the registry lock.
    streaming: Arc<AtomicBool>,
    /// Bounded outbound frame queue feeding the session's writer task.
    outbound: mpsc::Sender<Frame>,
    /// One-shot shutdown signal checked at the top of the session loop.
    shutdown: watch::Sender<bool>,
    /// Consecutive fan-out overflows; broadcaster-owned, reset on success.
    pub(crate) consecutive_overflows: u32,
}

impl SessionHandle {
    pub fn new(
        id: ClientId,
        peer: SocketAddr,
        streaming: Arc<AtomicBool>,
        outbound: mpsc::Sender<Frame>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            id,
            peer,
            streaming,
            outbound,
            shutdown,
            consecutive_overflows: 0,
        }
    }

    /// Returns `true` while the session is in streaming mode.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Non-blocking enqueue onto the session's outbound queue.
    pub(crate) fn try_send(&self, frame: Frame) -> Result<(), TrySendError<Frame>> {
        self.outbound.try_send(frame)
    }

    /// Tells the session task to stop.  Idempotent; the task may already
    /// have exited, in which case the signal goes nowhere.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// In-memory registry of all connected clients.
///
/// Shared by `Arc` between the listener (insert), each session's teardown
/// path (remove), the broadcaster (enumerate), and the dispatcher
/// (streaming check).
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, SessionHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted session.
    ///
    /// Ids come from a process-wide monotonic counter, so an insert can
    /// never collide with a live entry.
    pub async fn insert(&self, handle: SessionHandle) {
        let mut clients = self.clients.lock().await;
        debug!(client_id = handle.id, peer = %handle.peer, "session registered");
        let previous = clients.insert(handle.id, handle);
        debug_assert!(previous.is_none(), "client id reused for a live session");
    }

    /// Removes a session, returning its handle so the caller controls when
    /// the outbound queue sender drops.
    pub async fn remove(&self, id: ClientId) -> Option<SessionHandle> {
        let mut clients = self.clients.lock().await;
        let removed = clients.remove(&id);
        if removed.is_some() {
            debug!(client_id = id, "session deregistered");
        }
        removed
    }

    /// Number of currently registered sessions.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// Ids of all currently registered sessions.
    pub async fn ids(&self) -> Vec<ClientId> {
        self.clients.lock().await.keys().copied().collect()
    }

    /// Returns `true` if any registered session is in streaming mode.
    pub async fn any_streaming(&self) -> bool {
        self.clients
            .lock()
            .await
            .values()
            .any(SessionHandle::is_streaming)
    }

    /// Locks the map for a compound read-modify pass (fan-out, or the
    /// check-then-reconfigure step of SET_BUFFER_SIZE).
    pub(crate) async fn guard(&self) -> MutexGuard<'_, HashMap<ClientId, SessionHandle>> {
        self.clients.lock().await
    }

    /// Empties the registry, signalling shutdown to every session and
    /// returning the drained handles.  Used by the server's graceful stop.
    pub async fn drain(&self) -> Vec<SessionHandle> {
        let mut clients = self.clients.lock().await;
        let handles: Vec<SessionHandle> = clients.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.signal_shutdown();
        }
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(id: ClientId) -> (SessionHandle, mpsc::Receiver<Frame>, watch::Receiver<bool>) {
        let (out_tx, out_rx) = mpsc::channel(4);
        let (sd_tx, sd_rx) = watch::channel(false);
        let handle = SessionHandle::new(
            id,
            "127.0.0.1:9999".parse().unwrap(),
            Arc::new(AtomicBool::new(false)),
            out_tx,
            sd_tx,
        );
        (handle, out_rx, sd_rx)
    }

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty().await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_insert_and_remove_track_membership() {
        let registry = ClientRegistry::new();
        let (handle, _rx, _sd) = make_handle(3);
        registry.insert(handle).await;
        assert_eq!(registry.ids().await, vec![3]);

        let removed = registry.remove(3).await;
        assert!(removed.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_returns_none() {
        let registry = ClientRegistry::new();
        assert!(registry.remove(42).await.is_none());
    }

    #[tokio::test]
    async fn test_any_streaming_follows_session_flags() {
        let registry = ClientRegistry::new();
        let (handle, _rx, _sd) = make_handle(0);
        let flag = Arc::new(AtomicBool::new(false));
        let (out_tx, _out_rx) = mpsc::channel(4);
        let (sd_tx, _sd_rx) = watch::channel(false);
        let streaming_handle = SessionHandle::new(
            1,
            "127.0.0.1:9998".parse().unwrap(),
            Arc::clone(&flag),
            out_tx,
            sd_tx,
        );
        registry.insert(handle).await;
        registry.insert(streaming_handle).await;

        assert!(!registry.any_streaming().await);
        flag.store(true, Ordering::Release);
        assert!(registry.any_streaming().await);
        flag.store(false, Ordering::Release);
        assert!(!registry.any_streaming().await);
    }

    #[tokio::test]
    async fn test_drain_signals_shutdown_and_empties() {
        let registry = ClientRegistry::new();
        let (handle_a, _rx_a, sd_a) = make_handle(0);
        let (handle_b, _rx_b, sd_b) = make_handle(1);
        registry.insert(handle_a).await;
        registry.insert(handle_b).await;

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty().await);
        assert!(*sd_a.borrow());
        assert!(*sd_b.borrow());
    }

    #[tokio::test]
    async fn test_handle_try_send_reports_full_queue() {
        let (handle, mut rx, _sd) = make_handle(7);
        for _ in 0..4 {
            handle.try_send(Frame::ok("fill")).unwrap();
        }
        let overflow = handle.try_send(Frame::ok("overflow"));
        assert!(matches!(overflow, Err(TrySendError::Full(_))));

        // Draining one slot makes room again.
        rx.recv().await.unwrap();
        assert!(handle.try_send(Frame::ok("refill")).is_ok());
    }
}
