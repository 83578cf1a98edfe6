use std::{future::Future, sync::Arc};

use chrono::Utc;
use futures::FutureExt as _;

use crate::{
    api::ErrorModel,
    service::{
        store::StoreError,
        tasks::{
            BUSY_MESSAGE, CANCELLED_MESSAGE, NewTask, QueueFull, RESTART_MESSAGE, Task, TaskId,
            TaskStatus, TaskStore, WorkerPools,
        },
    },
};

/// Terminal result reported by a task body.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskCompletion),
    /// The body observed the cancellation flag and stopped cooperatively.
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCompletion {
    pub message: Option<String>,
    pub processed_records: Option<i64>,
    pub total_records: Option<i64>,
    pub error_count: i64,
    pub result_path: Option<String>,
}

impl TaskOutcome {
    #[must_use]
    pub fn completed(message: impl Into<String>) -> Self {
        TaskOutcome::Completed(TaskCompletion {
            message: Some(message.into()),
            ..TaskCompletion::default()
        })
    }
}

/// Capability handed to a task body: progress reporting and cancellation
/// checks against the owning task row.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: TaskId,
    store: Arc<dyn TaskStore>,
}

impl TaskHandle {
    #[must_use]
    pub fn new(id: TaskId, store: Arc<dyn TaskStore>) -> Self {
        Self { id, store }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether cancellation has been requested. A missing row (e.g. after a
    /// clear-all) reads as cancelled so the body stops doing work.
    pub async fn cancellation_requested(&self) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(self.id)
            .await?
            .is_none_or(|t| t.cancellation_requested))
    }

    pub async fn progress(&self, progress: f32, phase: &str) -> Result<(), StoreError> {
        self.report(progress, phase, None, None).await
    }

    /// Progress is kept monotonic and stays below 100 until the task
    /// completes; record counts are only overwritten when provided.
    pub async fn report(
        &self,
        progress: f32,
        phase: &str,
        processed_records: Option<i64>,
        total_records: Option<i64>,
    ) -> Result<(), StoreError> {
        let Some(mut task) = self.store.get(self.id).await? else {
            return Ok(());
        };
        task.progress = task.progress.max(progress.clamp(0.0, 99.0));
        task.phase = Some(phase.to_string());
        if processed_records.is_some() {
            task.processed_records = processed_records;
        }
        if total_records.is_some() {
            task.total_records = total_records;
        }
        task.updated_at = Utc::now();
        self.store.update(&task).await
    }
}

/// Outcome of a submission attempt. A rejected task has already been
/// transitioned to FAILED with the busy message.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Accepted(Task),
    Rejected(Task),
}

impl Submission {
    #[must_use]
    pub fn task(&self) -> &Task {
        match self {
            Submission::Accepted(task) | Submission::Rejected(task) => task,
        }
    }
}

/// Single entrypoint for every asynchronous operation: persists a PENDING
/// task in its own transaction, then hands the body to the right pool.
#[derive(Debug)]
pub struct TaskScheduler {
    tasks: Arc<dyn TaskStore>,
    pools: WorkerPools,
}

impl TaskScheduler {
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskStore>, pools: WorkerPools) -> Self {
        Self { tasks, pools }
    }

    #[must_use]
    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    #[tracing::instrument(skip(self, work), fields(kind = %new_task.kind))]
    pub async fn submit<F, Fut>(&self, new_task: NewTask, work: F) -> Result<Submission, StoreError>
    where
        F: FnOnce(TaskHandle) -> Fut,
        Fut: Future<Output = Result<TaskOutcome, ErrorModel>> + Send + 'static,
    {
        let task = self.tasks.create(new_task).await?;
        let handle = TaskHandle {
            id: task.id,
            store: self.tasks.clone(),
        };
        let body = work(handle);
        let store = self.tasks.clone();
        let id = task.id;

        match self
            .pools
            .pool_for(task.kind)
            .try_submit(run_task(store, id, body))
        {
            Ok(()) => {
                tracing::debug!(task_id = %task.id, "Task submitted");
                Ok(Submission::Accepted(task))
            }
            Err(QueueFull { pool }) => {
                tracing::warn!(task_id = %task.id, pool, "Submission rejected, queue full");
                let mut task = task;
                task.status = TaskStatus::Failed;
                task.message = Some(BUSY_MESSAGE.to_string());
                task.error_message = Some(BUSY_MESSAGE.to_string());
                task.ended_at = Some(Utc::now());
                task.updated_at = Utc::now();
                self.tasks.update(&task).await?;
                Ok(Submission::Rejected(task))
            }
        }
    }

    pub async fn shutdown(self) {
        self.pools.shutdown().await;
    }
}

/// Worker-side wrapper: RUNNING transition, panic containment, terminal
/// bookkeeping. Errors from the body never crash the worker.
async fn run_task<Fut>(store: Arc<dyn TaskStore>, id: TaskId, body: Fut)
where
    Fut: Future<Output = Result<TaskOutcome, ErrorModel>> + Send,
{
    let task = match store.get(id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            tracing::warn!(task_id = %id, "Task row disappeared before execution");
            return;
        }
        Err(e) => {
            tracing::error!(task_id = %id, "Failed to load task before execution: {e}");
            return;
        }
    };

    // Cancelled while still queued: never start the body.
    let result = if task.cancellation_requested {
        Ok(Ok(TaskOutcome::Cancelled))
    } else {
        let mut task = task;
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        task.updated_at = Utc::now();
        if let Err(e) = store.update(&task).await {
            tracing::error!(task_id = %id, "Failed to mark task RUNNING: {e}");
        }
        std::panic::AssertUnwindSafe(body).catch_unwind().await
    };

    let mut task = match store.get(id).await {
        Ok(Some(task)) => task,
        Ok(None) | Err(_) => {
            tracing::error!(task_id = %id, "Failed to reload task after execution");
            return;
        }
    };

    match result {
        Ok(Ok(TaskOutcome::Completed(completion))) => {
            task.status = TaskStatus::Completed;
            task.progress = 100.0;
            if completion.message.is_some() {
                task.message = completion.message;
            }
            if completion.processed_records.is_some() {
                task.processed_records = completion.processed_records;
            }
            if completion.total_records.is_some() {
                task.total_records = completion.total_records;
            }
            task.error_count = completion.error_count;
            if completion.result_path.is_some() {
                task.result_path = completion.result_path;
            }
        }
        Ok(Ok(TaskOutcome::Cancelled)) => {
            task.status = TaskStatus::Cancelled;
            task.message = Some(CANCELLED_MESSAGE.to_string());
        }
        Ok(Err(e)) => {
            tracing::warn!(task_id = %id, "Task failed: {e}");
            task.status = TaskStatus::Failed;
            task.message = Some(e.message.clone());
            task.error_message = Some(e.message);
        }
        Err(_panic) => {
            tracing::error!(task_id = %id, "Task body panicked");
            task.status = TaskStatus::Failed;
            task.error_message = Some("Internal error: task execution panicked".to_string());
        }
    }
    task.ended_at = Some(Utc::now());
    task.updated_at = Utc::now();
    if let Err(e) = store.update(&task).await {
        tracing::error!(task_id = %id, "Failed to persist terminal task state: {e}");
    }
}

/// Crash recovery: every task left PENDING or RUNNING by a previous process
/// is transitioned to FAILED so no zombies survive a restart. Call before
/// the pools accept work.
#[tracing::instrument(skip(store))]
pub async fn recover_interrupted(store: &Arc<dyn TaskStore>) -> Result<usize, StoreError> {
    let mut recovered = 0;
    for status in [TaskStatus::Pending, TaskStatus::Running] {
        loop {
            let batch = store.list_by_status(status, 500).await?;
            if batch.is_empty() {
                break;
            }
            for mut task in batch {
                task.status = TaskStatus::Failed;
                task.message = Some(RESTART_MESSAGE.to_string());
                task.error_message = Some(RESTART_MESSAGE.to_string());
                task.ended_at = Some(Utc::now());
                task.updated_at = Utc::now();
                store.update(&task).await?;
                recovered += 1;
            }
        }
    }
    if recovered > 0 {
        tracing::info!("Recovered {recovered} interrupted tasks as FAILED");
    }
    Ok(recovered)
}
