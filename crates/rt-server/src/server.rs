//! Server facade: binds the listener, owns the shared state, and offers the
//! publish side of the stream to the acquisition producer.
//!
//! Lifecycle: [`RtServer::start`] binds and begins accepting; sessions come
//! and go on their own; [`RtServer::stop`] signals everything down and waits
//! for the accept loop and every session task to finish before returning.

use std::net::SocketAddr;
use std::sync::Arc;

use fiff_stream::{ClientIdCounter, MeasurementBlock};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::acquisition::AcquisitionSource;
use crate::application::broadcast::StreamBroadcaster;
use crate::application::dispatch::CommandDispatcher;
use crate::application::registry::ClientRegistry;
use crate::infrastructure::network::listener::ConnectionListener;
use crate::infrastructure::storage::config::ServerConfig;

/// Errors surfaced while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen socket could not be bound or inspected.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running streaming server.
pub struct RtServer {
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    broadcaster: StreamBroadcaster,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<Vec<JoinHandle<()>>>,
}

impl RtServer {
    /// Binds the listen socket and starts accepting clients.
    ///
    /// Port 0 binds an ephemeral port; [`local_addr`] reports the real one.
    ///
    /// [`local_addr`]: RtServer::local_addr
    pub async fn start(
        config: &ServerConfig,
        source: Arc<dyn AcquisitionSource>,
    ) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::BindFailed { addr, source })?;

        let registry = Arc::new(ClientRegistry::new());
        let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&registry), source));
        let broadcaster = StreamBroadcaster::new(Arc::clone(&registry));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_loop = ConnectionListener::new(
            listener,
            Arc::new(ClientIdCounter::new()),
            dispatcher,
            Arc::clone(&registry),
            config.stream.client_queue_capacity,
            shutdown_rx,
        );
        let accept_task = tokio::spawn(accept_loop.run());

        info!(%local_addr, "server listening");
        Ok(Self {
            local_addr,
            registry,
            broadcaster,
            shutdown_tx,
            accept_task,
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clone of the fan-out handle, for the acquisition producer task.
    pub fn broadcaster(&self) -> StreamBroadcaster {
        self.broadcaster.clone()
    }

    /// Shutdown signal shared with auxiliary tasks (such as the producer),
    /// flipped to `true` by [`stop`].
    ///
    /// [`stop`]: RtServer::stop
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Fans one measurement block out to every streaming client.
    pub async fn publish(&self, block: MeasurementBlock) {
        self.broadcaster.on_block_available(block).await;
    }

    /// Number of currently connected clients.
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    /// Graceful shutdown: stops accepting, signals every session, and waits
    /// for all of them to finish their teardown.
    pub async fn stop(self) {
        info!("server stopping");
        let _ = self.shutdown_tx.send(true);

        let sessions = match self.accept_task.await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("accept loop panicked: {e}");
                Vec::new()
            }
        };

        // Each handle's shutdown signal makes its session leave the read
        // loop, deregister, and flush its writer.
        let _ = self.registry.drain().await;
        for session in sessions {
            if let Err(e) = session.await {
                warn!("session task panicked: {e}");
            }
        }
        info!("server stopped");
    }
}
