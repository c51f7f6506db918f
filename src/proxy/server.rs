//! Accept loop and connection lifecycle for the proxy listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use super::dump::FrameDump;
use super::session::{Session, SessionContext};
use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionPermit, ConnectionState, ConnectionTracker, Listener, ListenerError};
use crate::observability::{metrics, Logger};
use crate::shaping::FramePipeline;

/// Time force-closed sessions get to unwind before `run` returns.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

pub struct ProxyServer {
    context: Arc<SessionContext>,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
    log: Logger,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig, pipeline: Arc<FramePipeline>, dump: Option<FrameDump>, log: Logger) -> Self {
        Self {
            context: Arc::new(SessionContext::new(config, pipeline, dump)),
            drain_timeout: config.listener.drain_timeout(),
            tracker: ConnectionTracker::new(),
            log,
        }
    }

    /// Get the tracker of live sessions.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept until `shutdown` fires, then drain.
    ///
    /// Sessions still open after the drain timeout are force-closed.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ProxyError> {
        let force_close = Shutdown::new();
        tracing::info!(
            parent: self.log.span(),
            address = ?listener.local_addr().ok(),
            backend = %self.context.backend_address,
            "Proxy accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_session(stream, peer, permit, force_close.subscribe()),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(parent: self.log.span(), error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => return Err(e.into()),
                },
                _ = shutdown.recv() => break,
            }
        }

        drop(listener);
        tracing::info!(
            parent: self.log.span(),
            active = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );

        if !self.tracker.wait_for_drain(self.drain_timeout).await {
            tracing::warn!(
                parent: self.log.span(),
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed, closing remaining connections"
            );
            force_close.trigger();
            self.tracker.wait_for_drain(FORCE_CLOSE_GRACE).await;
        }

        tracing::info!(parent: self.log.span(), "Proxy stopped");
        Ok(())
    }

    fn spawn_session(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
        force_close: broadcast::Receiver<()>,
    ) {
        let guard = self.tracker.track();
        let log = self.log.connection(guard.id(), peer);
        let session = Session::new(stream, Arc::clone(&self.context), log.clone());
        let span = log.span().clone();

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                match session.run(force_close).await {
                    Ok(reason) => tracing::debug!(
                        parent: log.span(),
                        state = %ConnectionState::ClosingClean,
                        reason = reason.as_str(),
                        "Connection closed"
                    ),
                    Err(e) => {
                        metrics::record_backend_error(e.kind());
                        tracing::error!(
                            parent: log.span(),
                            state = %ConnectionState::ClosingError,
                            error = %e,
                            "Connection closed with error"
                        );
                    }
                }
            }
            .instrument(span),
        );
    }
}
