use facelapse_core::timelapse::{AssemblyError, TimelapseArtifact, TimelapseAssembler, TimelapseRequest};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("a timelapse job is already queued")]
    Busy,
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker thread exited")]
    ChannelClosed,
}

pub type JobReply = oneshot::Receiver<Result<TimelapseArtifact, AssemblyError>>;

/// Messages sent from the live loop or CLI to the worker thread.
enum WorkerRequest {
    Timelapse {
        request: TimelapseRequest,
        reply: oneshot::Sender<Result<TimelapseArtifact, AssemblyError>>,
    },
}

/// Clone-safe handle to the timelapse worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
}

impl WorkerHandle {
    /// Queue a job without waiting for it; the reply arrives on the receiver.
    pub fn submit(&self, request: TimelapseRequest) -> Result<JobReply, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .try_send(WorkerRequest::Timelapse {
                request,
                reply: reply_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => WorkerError::Busy,
                mpsc::error::TrySendError::Closed(_) => WorkerError::ChannelClosed,
            })?;
        Ok(reply_rx)
    }

    /// Run a job and wait for it.
    pub async fn timelapse(&self, request: TimelapseRequest) -> Result<TimelapseArtifact, WorkerError> {
        let reply = self.submit(request)?;
        Ok(reply.await.map_err(|_| WorkerError::ChannelClosed)??)
    }
}

/// Spawn the assembler on a dedicated OS thread. Jobs run one at a time in
/// submission order.
pub fn spawn_worker(mut assembler: TimelapseAssembler) -> Result<WorkerHandle, WorkerError> {
    let (tx, mut rx) = mpsc::channel::<WorkerRequest>(1);

    std::thread::Builder::new()
        .name("facelapse-worker".into())
        .spawn(move || {
            tracing::info!("worker thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    WorkerRequest::Timelapse { request, reply } => {
                        tracing::info!(
                            range = ?request.range,
                            fps = request.frame_rate,
                            quality = %request.quality,
                            "timelapse job received"
                        );
                        let result = assembler.assemble(&request);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("worker thread exiting");
        })
        .map_err(WorkerError::Spawn)?;

    Ok(WorkerHandle { tx })
}
