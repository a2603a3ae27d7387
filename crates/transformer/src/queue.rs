//! Deferred generation job queue.

use crate::error::TransformResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Job descriptor for deferred generation. The consumer re-invokes the
/// synchronous generation path for the index id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateTransformJob {
    pub index_id: i64,
}

/// Fire-and-forget job queue contract.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: GenerateTransformJob) -> TransformResult<()>;
}

/// In-process queue backed by an unbounded channel. The receiving half is
/// handed to whatever worker loop the host runs.
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<GenerateTransformJob>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GenerateTransformJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, job: GenerateTransformJob) -> TransformResult<()> {
        if self.tx.send(job).is_err() {
            // Fire-and-forget: a dropped consumer loses the job, and the
            // placeholder URL stays unresolved until an immediate request.
            tracing::warn!(index_id = job.index_id, "job queue consumer is gone");
        }
        Ok(())
    }
}
