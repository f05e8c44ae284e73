//! Command parsing and dispatch.
//!
//! `parse` is a pure decode; `dispatch` executes a parsed command against
//! the issuing session and, for SET_BUFFER_SIZE, against the shared
//! acquisition source.  The dispatcher depends only on the
//! [`AcquisitionSource`] trait and the registry, so it is fully
//! unit-testable with a mocked source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fiff_stream::{decode_command, ClientId, Command, CommandCode, Frame, StatusCode};
use tracing::{debug, info, warn};

use crate::application::acquisition::AcquisitionSource;
use crate::application::registry::ClientRegistry;

/// Upper bound for SET_BUFFER_SIZE, in samples per block.  Keeps a bogus
/// argument from making the producer allocate absurd blocks.
pub const MAX_BUFFER_SAMPLES: u32 = 65_536;

/// The dispatcher's view of the issuing session: its id and streaming flag.
///
/// The flag is the same atomic the session's [`SessionHandle`] exposes to
/// the broadcaster, so flipping it here immediately affects fan-out.
///
/// [`SessionHandle`]: crate::application::registry::SessionHandle
pub struct SessionContext {
    pub id: ClientId,
    streaming: Arc<AtomicBool>,
}

impl SessionContext {
    pub fn new(id: ClientId, streaming: Arc<AtomicBool>) -> Self {
        Self { id, streaming }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    fn set_streaming(&self, on: bool) {
        self.streaming.store(on, Ordering::Release);
    }
}

/// What the session loop should do with a dispatched command.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Frames to enqueue on the session's outbound queue, in order.
    pub frames: Vec<Frame>,
    /// `true` when the session should tear itself down after sending them.
    pub disconnect: bool,
}

impl DispatchOutcome {
    fn reply(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            disconnect: false,
        }
    }
}

/// Routes parsed commands to their effects.
pub struct CommandDispatcher {
    registry: Arc<ClientRegistry>,
    source: Arc<dyn AcquisitionSource>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<ClientRegistry>, source: Arc<dyn AcquisitionSource>) -> Self {
        Self { registry, source }
    }

    /// Pure, side-effect-free decode of one command frame.
    ///
    /// Fails closed: any unrecognized code byte yields the UNKNOWN command,
    /// never a partial or best-effort parse.
    pub fn parse(bytes: &[u8]) -> Result<Command, fiff_stream::ProtocolError> {
        decode_command(bytes)
    }

    /// Executes `cmd` for `session`, returning the response frames and
    /// whether the session should disconnect.
    pub async fn dispatch(&self, session: &SessionContext, cmd: Command) -> DispatchOutcome {
        let Some(kind) = cmd.kind else {
            warn!(
                client_id = session.id,
                code = format_args!("0x{:02X}", cmd.raw_code),
                "unknown command code"
            );
            return DispatchOutcome::reply(vec![Frame::error(
                StatusCode::Unknown,
                format!("unknown command code 0x{:02X}", cmd.raw_code),
            )]);
        };

        debug!(client_id = session.id, command = ?kind, arg = cmd.arg, "dispatching command");

        match kind {
            CommandCode::RequestInfo => self.request_info(),
            CommandCode::StartMeasurement => self.start_measurement(session),
            CommandCode::StopMeasurement => self.stop_measurement(session),
            CommandCode::SetBufferSize => self.set_buffer_size(session, cmd.arg).await,
            CommandCode::Disconnect => DispatchOutcome {
                frames: vec![Frame::ok("disconnecting")],
                disconnect: true,
            },
        }
    }

    /// REQUEST_INFO: serialized info header, no side effects.
    fn request_info(&self) -> DispatchOutcome {
        match self.source.info_header() {
            Some(header) => DispatchOutcome::reply(vec![Frame::InfoHeader(header)]),
            None => DispatchOutcome::reply(vec![Frame::error(
                StatusCode::NotReady,
                "acquisition source has no measurement info yet",
            )]),
        }
    }

    /// START_MEASUREMENT: negotiate the info header and enter streaming
    /// mode.  The header is sent as the stream preamble so the client can
    /// interpret the blocks that follow.
    fn start_measurement(&self, session: &SessionContext) -> DispatchOutcome {
        if session.is_streaming() {
            return DispatchOutcome::reply(vec![Frame::ok("already streaming")]);
        }
        match self.source.info_header() {
            Some(header) => {
                session.set_streaming(true);
                info!(client_id = session.id, "session entered streaming mode");
                DispatchOutcome::reply(vec![
                    Frame::InfoHeader(header),
                    Frame::ok("measurement started"),
                ])
            }
            None => DispatchOutcome::reply(vec![Frame::error(
                StatusCode::NotReady,
                "cannot start measurement: acquisition source not ready",
            )]),
        }
    }

    /// STOP_MEASUREMENT: leave streaming mode.  Harmless if the session was
    /// not streaming.
    fn stop_measurement(&self, session: &SessionContext) -> DispatchOutcome {
        let was_streaming = session.is_streaming();
        session.set_streaming(false);
        if was_streaming {
            info!(client_id = session.id, "session left streaming mode");
        }
        DispatchOutcome::reply(vec![Frame::ok("measurement stopped")])
    }

    /// SET_BUFFER_SIZE: validate first, then take the registry lock for the
    /// streaming check plus apply, so the lock is held only for the mutation
    /// itself and never for argument validation.
    async fn set_buffer_size(&self, session: &SessionContext, samples: u32) -> DispatchOutcome {
        if samples == 0 || samples > MAX_BUFFER_SAMPLES {
            return DispatchOutcome::reply(vec![Frame::error(
                StatusCode::Rejected,
                format!("buffer size {samples} out of range (1..={MAX_BUFFER_SAMPLES})"),
            )]);
        }

        // Buffer geometry may not change mid-stream: check every session
        // (including the issuer) under the registry lock and apply while
        // still holding it, so no one can start streaming in between.
        let guard = self.registry.guard().await;
        if guard.values().any(|handle| handle.is_streaming()) {
            drop(guard);
            warn!(
                client_id = session.id,
                samples, "buffer reconfiguration rejected: a session is streaming"
            );
            return DispatchOutcome::reply(vec![Frame::error(
                StatusCode::Rejected,
                "cannot change buffer size while a measurement is streaming",
            )]);
        }

        let result = self.source.set_buffer_size(samples);
        drop(guard);

        match result {
            Ok(()) => {
                info!(client_id = session.id, samples, "buffer size reconfigured");
                DispatchOutcome::reply(vec![Frame::ok(format!("buffer size set to {samples}"))])
            }
            Err(reason) => DispatchOutcome::reply(vec![Frame::error(
                StatusCode::Rejected,
                format!("acquisition source rejected buffer size {samples}: {reason}"),
            )]),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
