//! Diagnostic dump of raw input and output frames.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DumpConfig;
use crate::observability::Logger;

/// Handle for queueing frame pairs; cheap to clone.
///
/// Writes happen on a background task so the forward path never waits on
/// the filesystem. The queue is bounded and pairs are dropped while it is full.
#[derive(Debug, Clone)]
pub struct FrameDump {
    tx: mpsc::Sender<(Bytes, Bytes)>,
    dropped: Arc<AtomicU64>,
    log: Logger,
}

impl FrameDump {
    /// Open both files in append mode and start the writer task.
    ///
    /// The task ends once every handle has been dropped.
    pub async fn spawn(config: &DumpConfig, log: Logger) -> io::Result<(Self, JoinHandle<()>)> {
        let inputs = open_append(&config.input_path).await?;
        let outputs = open_append(&config.output_path).await?;
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        tracing::info!(
            parent: log.span(),
            inputs = %config.input_path,
            outputs = %config.output_path,
            "Frame dump enabled"
        );

        let task = tokio::spawn(write_loop(rx, inputs, outputs, log.clone()));
        let dump = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            log,
        };
        Ok((dump, task))
    }

    /// Queue one input frame and the bytes forwarded for it without waiting.
    pub fn record(&self, input: Bytes, output: Bytes) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send((input, output)) {
            if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                tracing::warn!(parent: self.log.span(), "Frame dump queue full, dropping frames");
            }
        }
    }

    /// Number of frame pairs dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn open_append(path: &str) -> io::Result<tokio::fs::File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn write_loop(
    mut rx: mpsc::Receiver<(Bytes, Bytes)>,
    mut inputs: tokio::fs::File,
    mut outputs: tokio::fs::File,
    log: Logger,
) {
    while let Some((input, output)) = rx.recv().await {
        if let Err(e) = append_line(&mut inputs, &input).await {
            tracing::warn!(parent: log.span(), error = %e, "Failed to write input dump");
        }
        if let Err(e) = append_line(&mut outputs, &output).await {
            tracing::warn!(parent: log.span(), error = %e, "Failed to write output dump");
        }
    }
    let _ = inputs.flush().await;
    let _ = outputs.flush().await;
}

async fn append_line(file: &mut tokio::fs::File, frame: &[u8]) -> io::Result<()> {
    let mut line = hex::encode(frame);
    line.push('\n');
    file.write_all(line.as_bytes()).await
}
