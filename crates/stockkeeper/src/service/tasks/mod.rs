use std::{fmt::Debug, ops::Deref};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::store::StoreError;

mod scheduler;
mod worker_pool;

pub use scheduler::{
    Submission, TaskCompletion, TaskHandle, TaskOutcome, TaskScheduler, recover_interrupted,
};
pub use worker_pool::{QueueFull, WorkerPool, WorkerPools};

pub const CANCELLED_MESSAGE: &str = "Task was cancelled by user";
pub const BUSY_MESSAGE: &str = "System is busy; try again later";
pub const RESTART_MESSAGE: &str = "Interrupted by restart";

/// Monotonic task identifier, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl Deref for TaskId {
    type Target = i64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    StylesUpload,
    StoresUpload,
    SkusUpload,
    SalesUpload,
    StylesDownload,
    StoresDownload,
    SkusDownload,
    SalesDownload,
    NoosDownload,
    AlgorithmRun,
}

impl TaskKind {
    /// Algorithm runs go to the noos executor, everything else to the file
    /// executor.
    #[must_use]
    pub fn is_algorithm(self) -> bool {
        matches!(self, TaskKind::AlgorithmRun)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Legal edges of the status DAG:
    /// `PENDING -> RUNNING -> {COMPLETED, FAILED, CANCELLED}`, with
    /// `PENDING -> {FAILED, CANCELLED}` for rejected or never-started work.
    #[must_use]
    pub fn may_transition_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(
                next,
                TaskStatus::Running | TaskStatus::Failed | TaskStatus::Cancelled
            ),
            TaskStatus::Running => next.is_terminal(),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => false,
        }
    }
}

/// A persisted record of one asynchronous unit of work.
///
/// The worker executing the task is the sole mutator between RUNNING and a
/// terminal state; the only field another actor may touch is
/// `cancellation_requested`, which is monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// 0.0 to 100.0; non-decreasing until terminal, 100.0 iff COMPLETED.
    pub progress: f32,
    pub phase: Option<String>,
    pub message: Option<String>,
    pub file_name: Option<String>,
    pub total_records: Option<i64>,
    pub processed_records: Option<i64>,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub result_path: Option<String>,
    pub cancellation_requested: bool,
    /// Opaque parameter string, persisted for audit only.
    pub parameters: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, typed_builder::TypedBuilder)]
pub struct NewTask {
    pub kind: TaskKind,
    #[builder(default)]
    pub file_name: Option<String>,
    #[builder(default)]
    pub parameters: Option<String>,
}

/// Aggregate counts for the task dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskKindStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Persistence seam for task records.
///
/// `create` must commit in its own transaction before returning so that a
/// worker on another thread can read the row immediately. `update` is
/// last-writer-wins at row level, except `cancellation_requested`, which
/// implementations must OR with the stored value to keep it monotonic.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync + Debug {
    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;
    async fn update(&self, task: &Task) -> Result<(), StoreError>;
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;
    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, StoreError>;
    async fn list_by_status(
        &self,
        status: TaskStatus,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;
    async fn count_by_status(&self) -> Result<TaskCounts, StoreError>;
    /// Sets the cancellation flag; no-op on terminal tasks. Returns the
    /// current row, `None` for unknown ids.
    async fn request_cancellation(&self, id: TaskId) -> Result<Option<Task>, StoreError>;
    async fn stats_by_kind_since(
        &self,
        kind: TaskKind,
        days: i64,
    ) -> Result<TaskKindStats, StoreError>;
}
