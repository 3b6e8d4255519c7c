//! # Bounded Worker Pool
//!
//! Fixed number of tokio workers draining a bounded job queue. When the
//! queue is full the configured [`RejectionPolicy`] decides whether the
//! caller fails fast or waits for a slot.

use crate::config::RejectionPolicy;
use crate::error::{OrchestratorError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub queued: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub panicked: u64,
}

pub struct BoundedWorkerPool {
    name: String,
    policy: RejectionPolicy,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
}

impl std::fmt::Debug for BoundedWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedWorkerPool")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl BoundedWorkerPool {
    /// Spawn `workers` workers; must be called inside a tokio runtime
    pub fn new(name: impl Into<String>, workers: usize, capacity: usize, policy: RejectionPolicy) -> Self {
        let name = name.into();
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(PoolCounters::default());

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let counters = Arc::clone(&counters);
                let pool_name = name.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        // Run on its own task so a panicking job does not take the worker down.
                        match tokio::spawn(job).await {
                            Ok(()) => {
                                counters.completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                counters.panicked.fetch_add(1, Ordering::Relaxed);
                                error!(pool = %pool_name, worker_id, error = %e, "🏊 POOL: Job panicked");
                            }
                        }
                    }
                    debug!(pool = %pool_name, worker_id, "🏊 POOL: Worker stopped");
                })
            })
            .collect();

        info!(pool = %name, workers, capacity, policy = ?policy, "🏊 POOL: Started");
        Self {
            name,
            policy,
            capacity,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            counters,
        }
    }

    /// Queue a job according to the rejection policy
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(sender) = self.sender.lock().clone() else {
            return Err(OrchestratorError::Capacity(format!("pool {} is shut down", self.name)));
        };
        let job: Job = Box::pin(job);

        let sent = match self.policy {
            RejectionPolicy::Reject => sender.try_send(job).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    format!("pool {} queue is full ({} jobs)", self.name, self.capacity)
                }
                mpsc::error::TrySendError::Closed(_) => format!("pool {} is shut down", self.name),
            }),
            RejectionPolicy::Wait => sender
                .send(job)
                .await
                .map_err(|_| format!("pool {} is shut down", self.name)),
        };

        match sent {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(message) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(OrchestratorError::Capacity(message))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let queued = self
            .sender
            .lock()
            .as_ref()
            .map_or(0, |sender| self.capacity - sender.capacity());
        PoolStats {
            workers: self.workers.lock().len(),
            queued,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, then wait for queued jobs to finish
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(pool = %self.name, error = %e, "🏊 POOL: Worker failed during shutdown");
            }
        }
        info!(pool = %self.name, "🏊 POOL: Shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_reject_policy_fails_when_queue_is_full() {
        let pool = BoundedWorkerPool::new("test", 1, 1, RejectionPolicy::Reject);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .await
        .unwrap();
        started_rx.await.unwrap();

        // Worker is busy; one job fits in the queue, the next is rejected.
        pool.submit(async {}).await.unwrap();
        let error = pool.submit(async {}).await.unwrap_err();
        assert!(matches!(error, OrchestratorError::Capacity(_)));
        assert_eq!(pool.stats().rejected, 1);

        release_tx.send(()).unwrap();
        pool.shutdown().await;
        assert_eq!(pool.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_wait_policy_holds_caller_until_slot_frees() {
        let pool = Arc::new(BoundedWorkerPool::new("test", 1, 1, RejectionPolicy::Wait));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        pool.submit(async move {
            let _ = release_rx.await;
        })
        .await
        .unwrap();
        pool.submit(async {}).await.unwrap();

        let waiting = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.submit(async {}).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        release_tx.send(()).unwrap();
        waiting.await.unwrap().unwrap();
        pool.shutdown().await;
        assert_eq!(pool.stats().completed, 3);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let pool = BoundedWorkerPool::new("test", 1, 4, RejectionPolicy::Reject);
        pool.submit(async { panic!("boom") }).await.unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        pool.submit(async move {
            let _ = done_tx.send(());
        })
        .await
        .unwrap();
        done_rx.await.unwrap();
        pool.shutdown().await;
        assert_eq!(pool.stats().panicked, 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = BoundedWorkerPool::new("test", 2, 2, RejectionPolicy::Wait);
        pool.shutdown().await;
        assert!(pool.submit(async {}).await.is_err());
    }
}
