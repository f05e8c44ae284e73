//! TCP connection to the streaming server.
//!
//! The client side of the protocol is sequential: send a 5-byte command
//! frame, then read the reply frames.  While streaming, measurement blocks
//! are interleaved on the same connection, so the command helpers that wait
//! for a status reply skip over any blocks still in flight.

use std::net::SocketAddr;

use fiff_stream::{
    decode_frame, encode_command, Command, CommandCode, Frame, InfoHeader, MeasurementBlock,
    ProtocolError, StatusCode, FRAME_HEADER_SIZE,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An inbound frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The connection was closed by the server.
    #[error("connection closed by server")]
    Closed,
    /// The server answered with a non-OK status.
    #[error("server status {code:?}: {message}")]
    ServerStatus { code: StatusCode, message: String },
    /// The server sent a frame the current operation cannot handle.
    #[error("expected {expected}, got {got:?}")]
    UnexpectedFrame {
        expected: &'static str,
        got: Frame,
    },
}

fn map_read_err(e: std::io::Error) -> ClientError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ClientError::Closed
    } else {
        ClientError::Io(e)
    }
}

/// One connection to the streaming server.
pub struct RtClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl RtClient {
    /// Connects to the server.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::ConnectFailed { addr, source })?;
        info!(server = %addr, "connected");
        Ok(Self { stream, peer: addr })
    }

    /// Address of the server this client is connected to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one raw command frame.
    pub async fn send_command(&mut self, cmd: Command) -> Result<(), ClientError> {
        debug!(command = ?cmd.kind, arg = cmd.arg, "sending command");
        self.stream.write_all(&encode_command(&cmd)).await?;
        Ok(())
    }

    /// Reads the next frame off the wire: 5-byte header, then the payload.
    pub async fn next_frame(&mut self) -> Result<Frame, ClientError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(map_read_err)?;

        let payload_len =
            u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut buf = vec![0u8; FRAME_HEADER_SIZE + payload_len];
        buf[..FRAME_HEADER_SIZE].copy_from_slice(&header);
        self.stream
            .read_exact(&mut buf[FRAME_HEADER_SIZE..])
            .await
            .map_err(map_read_err)?;

        let (frame, _consumed) = decode_frame(&buf)?;
        Ok(frame)
    }

    /// Reads frames until a status arrives, skipping measurement blocks that
    /// were already in flight when the command was sent.
    async fn next_status(&mut self) -> Result<(StatusCode, String), ClientError> {
        loop {
            match self.next_frame().await? {
                Frame::Status { code, message } => return Ok((code, message)),
                Frame::MeasurementBlock(block) => {
                    debug!(sequence = block.sequence, "skipping in-flight block");
                }
                other => {
                    return Err(ClientError::UnexpectedFrame {
                        expected: "status frame",
                        got: other,
                    })
                }
            }
        }
    }

    fn check_ok(code: StatusCode, message: String) -> Result<(), ClientError> {
        if code == StatusCode::Ok {
            Ok(())
        } else {
            Err(ClientError::ServerStatus { code, message })
        }
    }

    /// REQUEST_INFO: fetches the current measurement info header.
    pub async fn request_info(&mut self) -> Result<InfoHeader, ClientError> {
        self.send_command(Command::new(CommandCode::RequestInfo, 0))
            .await?;
        loop {
            match self.next_frame().await? {
                Frame::InfoHeader(header) => return Ok(header),
                Frame::Status { code, message } => {
                    return Err(ClientError::ServerStatus { code, message })
                }
                Frame::MeasurementBlock(block) => {
                    debug!(sequence = block.sequence, "skipping in-flight block");
                }
            }
        }
    }

    /// START_MEASUREMENT: subscribes to the stream.
    ///
    /// Returns the info header the server sends as the stream preamble; the
    /// blocks that follow are read with [`next_block`].
    ///
    /// [`next_block`]: RtClient::next_block
    pub async fn start_measurement(&mut self) -> Result<InfoHeader, ClientError> {
        self.send_command(Command::new(CommandCode::StartMeasurement, 0))
            .await?;
        match self.next_frame().await? {
            Frame::InfoHeader(header) => {
                let (code, message) = self.next_status().await?;
                Self::check_ok(code, message)?;
                Ok(header)
            }
            Frame::Status { code, message } => Err(ClientError::ServerStatus { code, message }),
            other => Err(ClientError::UnexpectedFrame {
                expected: "info header preamble",
                got: other,
            }),
        }
    }

    /// STOP_MEASUREMENT: unsubscribes.  Blocks still in flight when the
    /// command was sent are drained and discarded.
    pub async fn stop_measurement(&mut self) -> Result<(), ClientError> {
        self.send_command(Command::new(CommandCode::StopMeasurement, 0))
            .await?;
        let (code, message) = self.next_status().await?;
        Self::check_ok(code, message)
    }

    /// SET_BUFFER_SIZE: asks the server to reconfigure the block size.
    ///
    /// Fails with [`ClientError::ServerStatus`] when any client (including
    /// this one) is streaming or the argument is out of range.
    pub async fn set_buffer_size(&mut self, samples: u32) -> Result<(), ClientError> {
        self.send_command(Command::new(CommandCode::SetBufferSize, samples))
            .await?;
        let (code, message) = self.next_status().await?;
        Self::check_ok(code, message)
    }

    /// Reads the next measurement block.  Only meaningful while streaming.
    pub async fn next_block(&mut self) -> Result<MeasurementBlock, ClientError> {
        match self.next_frame().await? {
            Frame::MeasurementBlock(block) => Ok(block),
            other => Err(ClientError::UnexpectedFrame {
                expected: "measurement block",
                got: other,
            }),
        }
    }

    /// DISCONNECT: orderly goodbye.  Consumes the client; the server closes
    /// the connection after acknowledging.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send_command(Command::new(CommandCode::Disconnect, 0))
            .await?;
        let (code, message) = self.next_status().await?;
        Self::check_ok(code, message)?;
        info!(server = %self.peer, "disconnected");
        Ok(())
    }
}
