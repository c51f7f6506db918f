//! One client connection paired with one backend connection.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::dump::FrameDump;
use crate::config::ProxyConfig;
use crate::net::ConnectionState;
use crate::observability::Logger;
use crate::protocol::{ProtocolError, StreamReassembler};
use crate::shaping::FramePipeline;

const READ_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend connection to {address} failed: {source}")]
    BackendConnect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend connection to {0} timed out")]
    BackendConnectTimeout(String),

    #[error("client read failed: {0}")]
    ClientRead(#[source] std::io::Error),

    #[error("client write failed: {0}")]
    ClientWrite(#[source] std::io::Error),

    #[error("backend read failed: {0}")]
    BackendRead(#[source] std::io::Error),

    #[error("backend write failed: {0}")]
    BackendWrite(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Label for `priority_proxy_backend_errors_total`.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::BackendConnect { .. } => "backend_connect",
            SessionError::BackendConnectTimeout(_) => "backend_connect_timeout",
            SessionError::ClientRead(_) => "client_read",
            SessionError::ClientWrite(_) => "client_write",
            SessionError::BackendRead(_) => "backend_read",
            SessionError::BackendWrite(_) => "backend_write",
            SessionError::Protocol(_) => "protocol",
        }
    }
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    BackendClosed,
    /// The client sent nothing within the idle probe window.
    IdleProbe,
    /// Force-closed after the shutdown drain window.
    Shutdown,
}

impl CloseReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::BackendClosed => "backend_closed",
            CloseReason::IdleProbe => "idle_probe",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Settings and collaborators shared by every session.
pub struct SessionContext {
    pub backend_address: String,
    pub connect_timeout: Duration,
    pub idle_probe_timeout: Option<Duration>,
    pub max_frame_bytes: usize,
    pub pipeline: Arc<FramePipeline>,
    pub dump: Option<FrameDump>,
}

impl SessionContext {
    pub fn new(config: &ProxyConfig, pipeline: Arc<FramePipeline>, dump: Option<FrameDump>) -> Self {
        Self {
            backend_address: config.backend.address(),
            connect_timeout: config.backend.connect_timeout(),
            idle_probe_timeout: config.listener.idle_probe_timeout(),
            max_frame_bytes: config.shaping.max_frame_bytes,
            pipeline,
            dump,
        }
    }
}

pub struct Session {
    client: TcpStream,
    context: Arc<SessionContext>,
    log: Logger,
}

impl Session {
    pub fn new(client: TcpStream, context: Arc<SessionContext>, log: Logger) -> Self {
        Self { client, context, log }
    }

    /// Connect the backend, then relay until either side closes, an error
    /// occurs, or `force_close` fires.
    pub async fn run(self, mut force_close: broadcast::Receiver<()>) -> Result<CloseReason, SessionError> {
        let Session { client, context, log } = self;
        tracing::debug!(parent: log.span(), state = %ConnectionState::ConnectingBackend, "Client connected");

        let backend = connect_backend(&context).await?;
        let _ = client.set_nodelay(true);
        tracing::debug!(
            parent: log.span(),
            state = %ConnectionState::Streaming,
            backend = %context.backend_address,
            "Connected to backend"
        );

        let (mut client_rd, mut client_wr) = client.into_split();
        let (mut backend_rd, mut backend_wr) = backend.into_split();

        let result = tokio::select! {
            r = forward_frames(&context, &log, &mut client_rd, &mut backend_wr) => r,
            r = relay(&mut backend_rd, &mut client_wr) => r,
            _ = force_close.recv() => Ok(CloseReason::Shutdown),
        };

        let _ = backend_wr.shutdown().await;
        let _ = client_wr.shutdown().await;
        result
    }
}

async fn connect_backend(context: &SessionContext) -> Result<TcpStream, SessionError> {
    let address = &context.backend_address;
    let stream = match timeout(context.connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(SessionError::BackendConnect {
                address: address.clone(),
                source,
            })
        }
        Err(_) => return Err(SessionError::BackendConnectTimeout(address.clone())),
    };
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Client → backend: reassemble, shape, forward one frame at a time.
async fn forward_frames<R, W>(
    context: &SessionContext,
    log: &Logger,
    reader: &mut R,
    writer: &mut W,
) -> Result<CloseReason, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reassembler = StreamReassembler::with_max_frame_bytes(context.max_frame_bytes);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    if let Some(window) = context.idle_probe_timeout {
        match timeout(window, reader.read(&mut buf)).await {
            Err(_) => return Ok(CloseReason::IdleProbe),
            Ok(read) => {
                let n = read.map_err(SessionError::ClientRead)?;
                if n == 0 {
                    return Ok(CloseReason::ClientClosed);
                }
                forward_chunk(context, &mut reassembler, &buf[..n], writer).await?;
            }
        }
    }

    loop {
        let n = reader.read(&mut buf).await.map_err(SessionError::ClientRead)?;
        if n == 0 {
            if reassembler.pending() > 0 {
                tracing::debug!(
                    parent: log.span(),
                    pending = reassembler.pending(),
                    "Client closed mid-frame, dropping partial frame"
                );
            }
            return Ok(CloseReason::ClientClosed);
        }
        forward_chunk(context, &mut reassembler, &buf[..n], writer).await?;
    }
}

async fn forward_chunk<W>(
    context: &SessionContext,
    reassembler: &mut StreamReassembler,
    chunk: &[u8],
    writer: &mut W,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let Some(frame) = reassembler.feed(chunk)? else {
        return Ok(());
    };

    let input = frame.as_bytes().clone();
    let output = context.pipeline.process(frame);
    if let Some(dump) = &context.dump {
        dump.record(input, output.clone());
    }
    writer.write_all(&output).await.map_err(SessionError::BackendWrite)
}

/// Backend → client, byte for byte.
async fn relay<R, W>(reader: &mut R, writer: &mut W) -> Result<CloseReason, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await.map_err(SessionError::BackendRead)?;
        if n == 0 {
            return Ok(CloseReason::BackendClosed);
        }
        writer.write_all(&buf[..n]).await.map_err(SessionError::ClientWrite)?;
    }
}
