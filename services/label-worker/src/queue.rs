//! In-process job queues
//!
//! Each queue is an unbounded channel drained by one dispatcher task. The
//! dispatcher runs up to `concurrency` handlers at once; jobs of the same
//! queue carry no ordering guarantee relative to each other.
//!
//! A handler returning [`JobError::Transient`] is re-enqueued after
//! `retry_delay` while the job's retry budget lasts. Permanent failures and
//! exhausted budgets are logged and dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::JobError;

pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send + 'a>>;

/// Processes one job of type `J`.
pub trait JobHandler<J>: Send + Sync + 'static {
    fn handle<'a>(&'a self, id: Uuid, job: &'a J) -> JobFuture<'a>;
}

/// The queue's dispatcher has stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("queue {0} is closed")]
pub struct QueueClosed(pub &'static str);

struct Envelope<J> {
    id: Uuid,
    attempt: u32,
    job: J,
}

/// Producer side of a queue.
pub struct JobQueue<J> {
    name: &'static str,
    tx: mpsc::UnboundedSender<Envelope<J>>,
}

impl<J> Clone for JobQueue<J> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

/// Consumer side of a queue, handed to [`spawn_workers`].
pub struct QueueReceiver<J> {
    name: &'static str,
    rx: mpsc::UnboundedReceiver<Envelope<J>>,
}

#[cfg(test)]
impl<J> QueueReceiver<J> {
    /// Take the next queued job without running it.
    pub(crate) fn try_next(&mut self) -> Option<J> {
        self.rx.try_recv().ok().map(|envelope| envelope.job)
    }
}

impl<J: Send + 'static> JobQueue<J> {
    pub fn channel(name: &'static str) -> (Self, QueueReceiver<J>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { name, tx }, QueueReceiver { name, rx })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue a job and return its id.
    pub fn enqueue(&self, job: J) -> Result<Uuid, QueueClosed> {
        let id = Uuid::new_v4();
        self.tx
            .send(Envelope { id, attempt: 0, job })
            .map_err(|_| QueueClosed(self.name))?;
        debug!(queue = self.name, job_id = %id, "job enqueued");
        Ok(id)
    }
}

/// Worker settings for one queue.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub concurrency: usize,
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Spawn the dispatcher for a queue.
///
/// The task ends once every [`JobQueue`] handle is dropped and the channel
/// is drained. Pending retries do not keep the queue open.
pub fn spawn_workers<J, H>(
    queue: &JobQueue<J>,
    receiver: QueueReceiver<J>,
    handler: Arc<H>,
    options: WorkerOptions,
) -> JoinHandle<()>
where
    J: Send + Sync + 'static,
    H: JobHandler<J> + ?Sized,
{
    let retry_tx = queue.tx.downgrade();
    let QueueReceiver { name, mut rx } = receiver;
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let handler = handler.clone();
            let retry_tx = retry_tx.clone();

            tokio::spawn(async move {
                let Envelope { id, attempt, job } = envelope;
                let result = handler.handle(id, &job).await;
                drop(permit);

                match result {
                    Ok(()) => debug!(queue = name, job_id = %id, attempt, "job completed"),
                    Err(e) if e.is_transient() && attempt < options.max_retries => {
                        warn!(
                            queue = name,
                            job_id = %id,
                            attempt,
                            retry_in_secs = options.retry_delay.as_secs(),
                            error = %e,
                            "job failed, retrying"
                        );
                        tokio::time::sleep(options.retry_delay).await;
                        let retry = Envelope {
                            id,
                            attempt: attempt + 1,
                            job,
                        };
                        let sent = retry_tx.upgrade().is_some_and(|tx| tx.send(retry).is_ok());
                        if !sent {
                            warn!(queue = name, job_id = %id, "queue closed, retry dropped");
                        }
                    }
                    Err(e) => error!(
                        queue = name,
                        job_id = %id,
                        attempts = attempt + 1,
                        error = %e,
                        "job failed"
                    ),
                }
            });
        }
        debug!(queue = name, "queue closed, dispatcher exiting");
    })
}
