use std::sync::Arc;

pub mod download;
mod entities;
pub mod ingest;
pub mod noos;
pub mod store;
pub mod tasks;

pub use download::{DownloadBuilder, DownloadKind};
pub use entities::{
    AuditAction, AuditEntry, NewAuditEntry, NewNoosResult, NewSaleRecord, NewSku, NewStore,
    NewStyle, NoosResult, NoosType, SaleRecord, Sku, Store, Style,
};
pub use ingest::{IngestionPipeline, UploadKind, UploadOutcome, UploadResponse};
pub use noos::{AlgorithmParameters, NoosEngine, NoosRunOutcome, seed_default_parameters};
pub use store::{RetailStore, StoreError};
pub use tasks::{
    NewTask, Submission, Task, TaskHandle, TaskId, TaskKind, TaskOutcome, TaskScheduler,
    TaskStatus, TaskStore, recover_interrupted,
};

pub type Result<T, E = crate::api::ErrorModel> = std::result::Result<T, E>;

/// The service graph handed to the API layer. Constructed once at startup;
/// no global state beyond the worker pools inside the scheduler.
#[derive(Clone, Debug)]
pub struct State {
    pub tasks: Arc<dyn TaskStore>,
    pub store: Arc<dyn RetailStore>,
    pub scheduler: Arc<TaskScheduler>,
}

impl State {
    #[must_use]
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        store: Arc<dyn RetailStore>,
        scheduler: Arc<TaskScheduler>,
    ) -> Self {
        Self {
            tasks,
            store,
            scheduler,
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(self.store.clone())
    }

    #[must_use]
    pub fn engine(&self) -> NoosEngine {
        NoosEngine::new(self.store.clone())
    }

    #[must_use]
    pub fn downloads(&self) -> DownloadBuilder {
        DownloadBuilder::new(self.store.clone())
    }
}
