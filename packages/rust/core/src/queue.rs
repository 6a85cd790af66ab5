//! Single-worker FIFO job queue.
//!
//! Exactly one job executes pipeline stages at any instant. Serializing
//! the work avoids rate-limit contention against the AI provider and the
//! registry; raising concurrency later only needs a per-job lock.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use kybcheck_shared::{ContinueInput, JobId, KybError, Result};

use crate::pipeline::Orchestrator;

/// A unit of work for the pipeline worker.
#[derive(Debug)]
pub enum JobRequest {
    /// Run a freshly submitted job from the start.
    Start { job_id: JobId },
    /// Resume an `action_required` job with continuation input.
    Continue {
        job_id: JobId,
        input: ContinueInput,
    },
}

impl JobRequest {
    fn job_id(&self) -> JobId {
        match self {
            Self::Start { job_id } | Self::Continue { job_id, .. } => *job_id,
        }
    }
}

/// Handle for submitting work to the single pipeline worker.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobRequest>,
}

impl JobQueue {
    /// Spawn the worker task and return the submission handle. The worker
    /// runs until every queue handle is dropped.
    pub fn start(orchestrator: Arc<Orchestrator>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobRequest>();

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let job_id = request.job_id();
                info!(%job_id, "job dequeued");
                orchestrator.handle(request).await;
            }
            info!("job queue drained, worker exiting");
        });

        Self { tx }
    }

    /// Enqueue a request. Fails only if the worker has exited.
    pub fn submit(&self, request: JobRequest) -> Result<()> {
        self.tx.send(request).map_err(|e| {
            error!("job queue worker is gone");
            KybError::validation(format!("job queue unavailable: {e}"))
        })
    }
}
