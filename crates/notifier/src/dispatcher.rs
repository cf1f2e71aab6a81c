//! Message dispatcher: queue-backed outbound sender.
//!
//! Jobs are appended to an unbounded FIFO queue and drained by a fixed pool of
//! worker tasks. Every send goes through a shared semaphore, so the number of
//! simultaneous platform calls never exceeds the configured concurrency no matter
//! how many workers are running.
//!
//! Per job:
//! 1. Resolve the destination channel (unresolvable → drop, no retry)
//! 2. Send with exponential backoff (`RetryPolicy`); permission denial is terminal
//! 3. On success, optionally spawn a detached deferred deletion

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use hourbell_common::error::PlatformError;
use hourbell_common::platform::ChatPlatform;
use hourbell_common::types::{MessageHandle, MessageJob};

use crate::retry::RetryPolicy;

/// Default cap on simultaneous outbound sends.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default number of worker loops.
pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is stopped")]
    Closed,
}

/// Anything that accepts outbound jobs.
pub trait JobSink: Send + Sync {
    fn enqueue(&self, job: MessageJob) -> Result<(), DispatchError>;
}

/// Final state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
        message: MessageHandle,
        deletion_scheduled: bool,
    },
    /// The destination channel did not resolve; the job was dropped.
    ChannelUnavailable,
    PermissionDenied {
        attempts: u32,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        attempts: u32,
    },
    /// The dispatcher was stopped before a send slot became free.
    LimiterClosed,
}

/// Sends a single job. Shared by all workers.
#[derive(Clone)]
struct Courier {
    platform: Arc<dyn ChatPlatform>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Courier {
    async fn deliver(&self, job: &MessageJob) -> DeliveryOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return DeliveryOutcome::LimiterClosed;
        };

        let channel = match self.platform.resolve_channel(job.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                tracing::warn!(
                    job_id = %job.id,
                    channel_id = %job.channel_id,
                    "Channel not found, dropping job"
                );
                return DeliveryOutcome::ChannelUnavailable;
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    channel_id = %job.channel_id,
                    error = %e,
                    "Channel could not be resolved, dropping job"
                );
                return DeliveryOutcome::ChannelUnavailable;
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.platform.send(&channel, &job.content).await {
                Ok(message) => {
                    let deletion_scheduled = match job.deletion_delay() {
                        Some(secs) => {
                            spawn_deferred_delete(
                                Arc::clone(&self.platform),
                                message.clone(),
                                Duration::from_secs(secs),
                            );
                            true
                        }
                        None => false,
                    };

                    tracing::info!(
                        job_id = %job.id,
                        channel_id = %job.channel_id,
                        message_id = message.message_id,
                        attempt,
                        "Message sent"
                    );

                    return DeliveryOutcome::Delivered {
                        attempts: attempt,
                        message,
                        deletion_scheduled,
                    };
                }
                Err(e) if e.is_terminal() => {
                    tracing::error!(
                        job_id = %job.id,
                        channel_id = %job.channel_id,
                        error = %e,
                        "No permission to send, dropping job"
                    );
                    return DeliveryOutcome::PermissionDenied { attempts: attempt };
                }
                Err(e) => {
                    if !self.retry.allows_retry_after(attempt) {
                        tracing::error!(
                            job_id = %job.id,
                            channel_id = %job.channel_id,
                            attempts = attempt,
                            error = %e,
                            "Send failed, giving up"
                        );
                        return DeliveryOutcome::Exhausted { attempts: attempt };
                    }

                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Delete `message` after `delay`, on a detached task.
///
/// Runs outside the concurrency limiter. Failures are logged and never retried.
fn spawn_deferred_delete(platform: Arc<dyn ChatPlatform>, message: MessageHandle, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match platform.delete(&message).await {
            Ok(()) => {
                tracing::debug!(
                    channel_id = %message.channel_id,
                    message_id = message.message_id,
                    "Expired message deleted"
                );
            }
            Err(PlatformError::PermissionDenied(e)) => {
                tracing::warn!(message_id = message.message_id, error = %e, "No permission to delete message");
            }
            Err(PlatformError::NotFound(_)) => {
                tracing::warn!(message_id = message.message_id, "Message already deleted");
            }
            Err(e) => {
                tracing::warn!(message_id = message.message_id, error = %e, "Message deletion failed");
            }
        }
    });
}

/// Queue + worker pool in front of a [`ChatPlatform`].
pub struct MessageDispatcher {
    courier: Courier,
    sender: mpsc::UnboundedSender<MessageJob>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<MessageJob>>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl MessageDispatcher {
    pub fn new(platform: Arc<dyn ChatPlatform>, concurrency: usize) -> Self {
        Self::with_retry_policy(platform, concurrency, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        platform: Arc<dyn ChatPlatform>,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            courier: Courier {
                platform,
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
                retry,
            },
            sender,
            queue: Arc::new(Mutex::new(receiver)),
            shutdown,
            closed: AtomicBool::new(false),
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawn `worker_count` worker loops. Calling this on a running dispatcher is a no-op.
    pub fn start(&self, worker_count: usize) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("Dispatcher already stopped, not starting workers");
            return;
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            tracing::debug!(running = workers.len(), "Dispatcher already started");
            return;
        }

        let worker_count = worker_count.max(1);
        for worker_id in 1..=worker_count {
            workers.push(tokio::spawn(run_worker(
                worker_id,
                self.courier.clone(),
                Arc::clone(&self.queue),
                self.shutdown.subscribe(),
            )));
        }

        tracing::info!(
            workers = worker_count,
            concurrency = self.courier.permits.available_permits(),
            "Dispatcher started"
        );
    }

    /// Stop all workers and wait for them to exit. Jobs still queued are abandoned;
    /// deferred deletions already spawned keep running.
    pub async fn stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        self.courier.permits.close();

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Dispatcher worker ended abnormally");
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Send one job right away on the caller's task, bypassing the queue
    /// but not the concurrency limiter.
    pub async fn deliver(&self, job: &MessageJob) -> DeliveryOutcome {
        self.courier.deliver(job).await
    }

    /// Number of running worker loops.
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl JobSink for MessageDispatcher {
    fn enqueue(&self, job: MessageJob) -> Result<(), DispatchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }
        tracing::debug!(job_id = %job.id, channel_id = %job.channel_id, "Job queued");
        self.sender.send(job).map_err(|_| DispatchError::Closed)
    }
}

async fn run_worker(
    worker_id: usize,
    courier: Courier,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<MessageJob>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "Dispatcher worker started");

    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => None,
                job = queue.recv() => job,
            }
        };

        let Some(job) = next else {
            break;
        };

        // Stop wins over delivery at every suspension point. A send that has already
        // completed in the same poll can lose its deferred delete this way.
        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => {
                tracing::warn!(worker_id, job_id = %job.id, "Dispatcher stopping, abandoning in-flight job");
                break;
            }
            outcome = courier.deliver(&job) => {
                tracing::debug!(worker_id, job_id = %job.id, ?outcome, "Job finished");
            }
        }
    }

    tracing::debug!(worker_id, "Dispatcher worker exited");
}

/// Resolves once the shutdown flag is raised (or its sender is gone).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
