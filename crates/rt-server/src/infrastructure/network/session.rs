//! Per-client session: one task owning the socket, one writer task draining
//! the outbound queue.
//!
//! The reader task blocks on exact-size command frames and services them
//! inline; the writer task is the only writer on the connection, so command
//! responses and measurement blocks leave in exactly the order they were
//! enqueued.  Streaming and command servicing are concurrent: a streaming
//! client can issue commands without losing its place in the stream.
//!
//! The shutdown signal (server stop, DISCONNECT, broadcaster overflow
//! policy) is checked at the top of the read loop via `select!`.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use fiff_stream::{encode_frame, ClientId, Command, Frame, COMMAND_FRAME_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::application::dispatch::{CommandDispatcher, SessionContext};
use crate::application::registry::{ClientRegistry, SessionHandle};

/// How long teardown waits for the writer to flush remaining frames to a
/// peer that closed its read side before the socket is forcibly dropped.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Protocol state of a session, tracked for logging and transition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no well-formed command seen yet.
    Idle,
    /// At least one well-formed command processed; not streaming.
    CommandMode,
    /// Subscribed to the measurement stream.
    StreamingMode,
}

/// Computes the state after a command was serviced.
///
/// A malformed (unknown) command never changes state; otherwise the state
/// follows the streaming flag, with Idle left behind on the first
/// well-formed command.
fn transition_after(state: SessionState, command_known: bool, streaming: bool) -> SessionState {
    if !command_known {
        return state;
    }
    if streaming {
        SessionState::StreamingMode
    } else {
        SessionState::CommandMode
    }
}

/// One connected client's protocol state and I/O.
pub struct ClientSession {
    id: ClientId,
    peer: SocketAddr,
    state: SessionState,
    context: SessionContext,
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<ClientRegistry>,
    outbound_tx: mpsc::Sender<Frame>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ClientSession {
    /// Builds a session together with its registry handle and the receiving
    /// end of its outbound queue.
    ///
    /// The streaming flag is shared between the session's dispatch context
    /// and the handle the broadcaster sees.
    pub fn new(
        id: ClientId,
        peer: SocketAddr,
        dispatcher: Arc<CommandDispatcher>,
        registry: Arc<ClientRegistry>,
        queue_capacity: usize,
    ) -> (Self, SessionHandle, mpsc::Receiver<Frame>) {
        let streaming = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SessionHandle::new(
            id,
            peer,
            Arc::clone(&streaming),
            outbound_tx.clone(),
            shutdown_tx,
        );
        let session = Self {
            id,
            peer,
            state: SessionState::Idle,
            context: SessionContext::new(id, streaming),
            dispatcher,
            registry,
            outbound_tx,
            shutdown_rx,
        };
        (session, handle, outbound_rx)
    }

    /// Drives the session until disconnect, I/O failure, or shutdown, then
    /// deregisters it and waits for the writer to flush.
    pub async fn run(mut self, stream: TcpStream, outbound_rx: mpsc::Receiver<Frame>) {
        info!(client_id = self.id, peer = %self.peer, "session started");

        let (mut read_half, write_half) = stream.into_split();
        let mut writer = tokio::spawn(writer_loop(
            self.id,
            write_half,
            outbound_rx,
            self.shutdown_rx.clone(),
        ));

        let mut buf = [0u8; COMMAND_FRAME_SIZE];
        loop {
            tokio::select! {
                // Shutdown signal wins over a pending read.  A dropped
                // sender counts as shutdown too.
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!(client_id = self.id, "session shutting down on signal");
                        break;
                    }
                }
                result = read_half.read_exact(&mut buf) => {
                    match result {
                        Ok(_) => {
                            if !self.handle_command(&buf).await {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                            info!(client_id = self.id, "client closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(client_id = self.id, "read error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        // Remove the handle before dropping our sender: once both are gone
        // the writer drains the remaining frames and closes the socket.  A
        // peer that stopped reading can stall that drain, so the wait is
        // bounded; past the deadline the writer is aborted and the socket
        // dropped mid-flush.
        self.registry.remove(self.id).await;
        drop(self.outbound_tx);
        match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await {
            Ok(Err(e)) => warn!(client_id = self.id, "writer task panicked: {e}"),
            Ok(Ok(())) => {}
            Err(_) => {
                warn!(client_id = self.id, "writer did not flush in time, aborting");
                writer.abort();
                let _ = writer.await;
            }
        }
        info!(client_id = self.id, "session closed");
    }

    /// Parses and dispatches one command frame.  Returns `false` when the
    /// session should tear down.
    async fn handle_command(&mut self, buf: &[u8; COMMAND_FRAME_SIZE]) -> bool {
        // A full frame is always decodable; unrecognized codes come back as
        // the UNKNOWN command rather than an error.
        let cmd = CommandDispatcher::parse(buf).unwrap_or_else(|_| Command::unknown(buf[0], 0));

        let outcome = self.dispatcher.dispatch(&self.context, cmd).await;

        let next = transition_after(self.state, cmd.is_known(), self.context.is_streaming());
        if next != self.state {
            debug!(client_id = self.id, from = ?self.state, to = ?next, "state transition");
            self.state = next;
        }

        for frame in outcome.frames {
            if self.outbound_tx.send(frame).await.is_err() {
                // Writer is gone; the connection is dead.
                warn!(client_id = self.id, "outbound queue closed, tearing down");
                return false;
            }
        }

        !outcome.disconnect
    }
}

/// Single writer on the connection: drains the outbound queue in order and
/// closes the socket when every sender is gone.
///
/// The shutdown signal interrupts both the queue wait and a write stuck on
/// a peer that stopped reading, so a stalled client can always be torn down.
async fn writer_loop(
    id: ClientId,
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Frame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(client_id = id, "writer stopping on signal");
                    return;
                }
                continue;
            }
        };

        let bytes = encode_frame(&frame);
        tokio::select! {
            result = write_half.write_all(&bytes) => {
                if let Err(e) = result {
                    warn!(client_id = id, "write error: {e}");
                    return;
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(client_id = id, "abandoning stalled write on signal");
                    return;
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_leaves_on_first_well_formed_command() {
        let next = transition_after(SessionState::Idle, true, false);
        assert_eq!(next, SessionState::CommandMode);
    }

    #[test]
    fn test_malformed_command_never_changes_state() {
        for state in [
            SessionState::Idle,
            SessionState::CommandMode,
            SessionState::StreamingMode,
        ] {
            assert_eq!(transition_after(state, false, false), state);
        }
    }

    #[test]
    fn test_streaming_flag_drives_streaming_state() {
        assert_eq!(
            transition_after(SessionState::CommandMode, true, true),
            SessionState::StreamingMode
        );
        assert_eq!(
            transition_after(SessionState::StreamingMode, true, false),
            SessionState::CommandMode
        );
    }

    #[test]
    fn test_command_while_streaming_keeps_subscription() {
        // A query command while streaming leaves the streaming flag set, so
        // the state stays StreamingMode.
        assert_eq!(
            transition_after(SessionState::StreamingMode, true, true),
            SessionState::StreamingMode
        );
    }
}
