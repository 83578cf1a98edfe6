use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{CONFIG, config::PoolSizing, service::tasks::TaskKind};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Rejection signal: all workers are busy and the wait queue is full.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker pool `{pool}` rejected the submission: queue is full")]
pub struct QueueFull {
    pub pool: &'static str,
}

/// A bounded pool of long-lived workers.
///
/// `parallelism` jobs execute concurrently and up to `queue_capacity`
/// further submissions wait in FIFO order; anything beyond that is rejected
/// with [`QueueFull`]. Submission returns immediately and exposes no
/// completion handle; callers observe progress through the task store.
#[derive(Debug)]
pub struct WorkerPool {
    name: &'static str,
    slots: Arc<Semaphore>,
    tx: async_channel::Sender<(OwnedSemaphorePermit, Job)>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the workers onto the current tokio runtime.
    #[must_use]
    pub fn new(name: &'static str, sizing: PoolSizing) -> Self {
        let parallelism = sizing.parallelism.max(1);
        let (tx, rx) = async_channel::unbounded::<(OwnedSemaphorePermit, Job)>();
        let workers = (0..parallelism)
            .map(|worker| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    while let Ok((permit, job)) = rx.recv().await {
                        job.await;
                        drop(permit);
                    }
                    tracing::debug!(pool = name, worker, "Worker pool channel closed, exiting");
                })
            })
            .collect();
        Self {
            name,
            // Admission control: one permit per worker plus one per queue
            // slot. A job holds its permit until it finishes executing.
            slots: Arc::new(Semaphore::new(parallelism + sizing.queue_capacity)),
            tx,
            workers,
        }
    }

    pub fn try_submit(
        &self,
        job: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), QueueFull> {
        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| QueueFull { pool: self.name })?;
        self.tx
            .try_send((permit, Box::pin(job)))
            .map_err(|_| QueueFull { pool: self.name })
    }

    /// Stops accepting submissions and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.tx.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(pool = self.name, "Worker task join failed: {e}");
            }
        }
    }
}

/// The pools backing the scheduler: uploads and downloads share the file
/// executor, algorithm runs get their own.
#[derive(Debug)]
pub struct WorkerPools {
    pub file: WorkerPool,
    pub noos: WorkerPool,
}

impl WorkerPools {
    #[must_use]
    pub fn from_config() -> Self {
        Self::new(CONFIG.file_workers, CONFIG.noos_workers)
    }

    #[must_use]
    pub fn new(file: PoolSizing, noos: PoolSizing) -> Self {
        Self {
            file: WorkerPool::new("fileExecutor", file),
            noos: WorkerPool::new("noosExecutor", noos),
        }
    }

    #[must_use]
    pub fn pool_for(&self, kind: TaskKind) -> &WorkerPool {
        if kind.is_algorithm() {
            &self.noos
        } else {
            &self.file
        }
    }

    pub async fn shutdown(self) {
        self.file.shutdown().await;
        self.noos.shutdown().await;
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[tokio::test]
    async fn test_jobs_run_and_release_slots() {
        let pool = WorkerPool::new(
            "test",
            PoolSizing {
                parallelism: 2,
                queue_capacity: 2,
            },
        );
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            loop {
                let counter = counter.clone();
                match pool.try_submit(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) {
                    Ok(()) => break,
                    Err(QueueFull { .. }) => tokio::task::yield_now().await,
                }
            }
        }
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_with_queue_full() {
        let pool = WorkerPool::new(
            "test",
            PoolSizing {
                parallelism: 1,
                queue_capacity: 0,
            },
        );
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        pool.try_submit(async move {
            release_rx.await.ok();
        })
        .unwrap();

        // The single slot is held by the blocked job above.
        let rejected = pool.try_submit(async {});
        assert_eq!(rejected, Err(QueueFull { pool: "test" }));

        release_tx.send(()).unwrap();
        pool.shutdown().await;
    }
}
