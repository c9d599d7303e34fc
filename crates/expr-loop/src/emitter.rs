use std::sync::atomic::{AtomicBool, Ordering};

use expr_core::{AgentError, OutboundFrame};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Ordered frame sink for one request.
///
/// Guarantees at most one terminal frame: either a single `status` from
/// [`finish`](Self::finish) or a single `error` from [`reject`](Self::reject).
/// A closed receiver means the caller went away, so the request is cancelled.
pub struct FrameEmitter {
    tx: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
    finished: AtomicBool,
}

impl FrameEmitter {
    pub fn new(tx: mpsc::Sender<OutboundFrame>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            finished: AtomicBool::new(false),
        }
    }

    pub async fn chunk(&self, text: impl Into<String>) -> Result<(), AgentError> {
        let text = text.into();
        if text.is_empty() || self.is_finished() {
            return Ok(());
        }
        self.send(OutboundFrame::chunk(text)).await
    }

    /// Sends the `status` frame once; later calls are no-ops.
    pub async fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.send(OutboundFrame::streaming_end()).await;
    }

    /// Ends the stream with an `error` frame and no `status`.
    pub async fn reject(&self, message: impl Into<String>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.send(OutboundFrame::error(message)).await;
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: OutboundFrame) -> Result<(), AgentError> {
        if self.tx.send(frame).await.is_err() {
            self.cancel.cancel();
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }
}
