//! Accept loop: turns incoming TCP connections into registered sessions.

use std::sync::Arc;

use fiff_stream::ClientIdCounter;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::dispatch::CommandDispatcher;
use crate::application::registry::ClientRegistry;
use crate::infrastructure::network::session::ClientSession;

/// Accepts connections and spawns one session task per client.
///
/// Ids come from a shared monotonic counter, so every connection over the
/// server's lifetime gets a fresh one; ids are never reused even after a
/// client disconnects.
pub struct ConnectionListener {
    listener: TcpListener,
    ids: Arc<ClientIdCounter>,
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<ClientRegistry>,
    queue_capacity: usize,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionListener {
    pub fn new(
        listener: TcpListener,
        ids: Arc<ClientIdCounter>,
        dispatcher: Arc<CommandDispatcher>,
        registry: Arc<ClientRegistry>,
        queue_capacity: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            ids,
            dispatcher,
            registry,
            queue_capacity,
            shutdown_rx,
        }
    }

    /// Runs the accept loop until the shutdown signal fires.
    ///
    /// A failed accept is logged and the loop keeps serving; it never brings
    /// the server down.  Returns the join handles of every session task
    /// spawned, so the server's stop path can await them.
    pub async fn run(mut self) -> Vec<JoinHandle<()>> {
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("listener stopping");
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            // Keep the handle list from growing with client
                            // churn; only live tasks matter to the stop path.
                            prune_finished(&mut sessions);
                            let id = self.ids.next();
                            info!(client_id = id, %peer, "client connected");

                            let (session, handle, outbound_rx) = ClientSession::new(
                                id,
                                peer,
                                Arc::clone(&self.dispatcher),
                                Arc::clone(&self.registry),
                                self.queue_capacity,
                            );
                            self.registry.insert(handle).await;
                            sessions.push(tokio::spawn(session.run(stream, outbound_rx)));
                        }
                        Err(e) => {
                            warn!("accept failed: {e}");
                        }
                    }
                }
            }
        }

        // Completed sessions have already removed themselves from the
        // registry; their handles resolve immediately when awaited.
        sessions
    }
}

/// Drops join handles of session tasks that already finished.
fn prune_finished(sessions: &mut Vec<JoinHandle<()>>) {
    sessions.retain(|session| !session.is_finished());
}
