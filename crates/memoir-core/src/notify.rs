//! Bounded notification queue.
//!
//! Request-handling code enqueues outbound email jobs; a single long-lived
//! worker drains them in FIFO order and hands each to an [`EmailSender`].
//! Delivery is best-effort: a failed send is logged and abandoned rather
//! than retried, so one dead recipient cannot block the queue head.

use std::sync::Arc;

use memoir_types::{DiaryError, NotificationJob, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_CAPACITY: usize = 100;

/// The external delivery collaborator (SMTP or similar). Implementations may
/// block; the worker dispatches them off the async runtime.
pub trait EmailSender: Send + Sync + 'static {
    fn send(&self, job: &NotificationJob) -> anyhow::Result<()>;
}

/// Producer half. Cheap to clone into request handlers.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<NotificationJob>,
}

/// Consumer half, owned by the single worker task.
pub struct NotificationReceiver {
    rx: mpsc::Receiver<NotificationJob>,
}

impl NotificationQueue {
    /// A bounded FIFO pipe of the given capacity. Producers awaiting a full
    /// queue apply backpressure to their callers; jobs are never dropped on
    /// enqueue and the queue never grows past `capacity`.
    pub fn new(capacity: usize) -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, NotificationReceiver { rx })
    }

    /// A queue at [`DEFAULT_CAPACITY`].
    pub fn with_default_capacity() -> (Self, NotificationReceiver) {
        Self::new(DEFAULT_CAPACITY)
    }

    pub async fn enqueue(&self, job: NotificationJob) -> Result<()> {
        if job.recipient.trim().is_empty() {
            return Err(DiaryError::InvalidArgument(
                "notification recipient is empty".into(),
            ));
        }
        self.tx
            .send(job)
            .await
            .map_err(|_| DiaryError::Storage(anyhow::anyhow!("notification queue is closed")))
    }
}

/// Drain jobs one at a time until the queue closes or `shutdown` fires.
///
/// Send failures are logged and the loop continues; a send already in
/// flight when shutdown fires still finishes (and may still fail, equally
/// gracefully). Never panics, never propagates to enqueuers.
pub async fn run_notification_worker(
    mut receiver: NotificationReceiver,
    sender: Arc<dyn EmailSender>,
    shutdown: CancellationToken,
) {
    info!("notification worker started");
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = receiver.rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let dispatch = {
            let sender = sender.clone();
            let job = job.clone();
            tokio::task::spawn_blocking(move || sender.send(&job))
        };
        match dispatch.await {
            Ok(Ok(())) => debug!(recipient = %job.recipient, "notification sent"),
            Ok(Err(e)) => warn!(recipient = %job.recipient, "notification send failed: {e:#}"),
            Err(e) => warn!("notification send task panicked: {e}"),
        }
    }
    info!("notification worker stopped");
}
