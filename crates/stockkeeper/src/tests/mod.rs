//! Multi-component scenarios over the in-memory store: upload pipelines,
//! algorithm runs, scheduler behaviour and the HTTP surface.

use std::{sync::Arc, time::Duration};

use crate::{
    PoolSizing,
    implementations::memory::MemoryStore,
    service::{RetailStore, State, TaskScheduler, TaskStore, tasks::{TaskId, WorkerPools}},
};

mod ingest_ops;
mod router_ops;
mod task_ops;

pub(crate) fn test_state_with_pools(file: PoolSizing, noos: PoolSizing) -> State {
    let store = Arc::new(MemoryStore::new());
    let tasks: Arc<dyn TaskStore> = store.clone();
    let retail: Arc<dyn RetailStore> = store;
    let scheduler = Arc::new(TaskScheduler::new(tasks.clone(), WorkerPools::new(file, noos)));
    State::new(tasks, retail, scheduler)
}

pub(crate) fn test_state() -> State {
    test_state_with_pools(
        PoolSizing {
            parallelism: 2,
            queue_capacity: 8,
        },
        PoolSizing {
            parallelism: 1,
            queue_capacity: 4,
        },
    )
}

/// Polls until the task reaches a terminal state.
pub(crate) async fn wait_for_terminal(state: &State, id: TaskId) -> crate::service::Task {
    for _ in 0..1000 {
        let task = state
            .tasks
            .get(id)
            .await
            .expect("task store read failed")
            .expect("task disappeared");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("task {id} did not reach a terminal state");
}

/// Polls until the task is observed in the given status.
pub(crate) async fn wait_for_status(
    state: &State,
    id: TaskId,
    status: crate::service::TaskStatus,
) -> crate::service::Task {
    for _ in 0..1000 {
        let task = state
            .tasks
            .get(id)
            .await
            .expect("task store read failed")
            .expect("task disappeared");
        if task.status == status {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("task {id} never reached {status}");
}

pub(crate) const STYLES_TSV: &str = "style\tbrand\tcategory\tsub_category\tmrp\tgender\n\
     STY1\tAcme\tShirts\tCasual\t499.99\tMen\n\
     STY2\tAcme\tShirts\tFormal\t599.99\tWomen\n";

pub(crate) const SKUS_TSV: &str = "sku\tstyle\tsize\n\
     SKU1\tSTY1\tM\n\
     SKU2\tsty2\tL\n";

pub(crate) const STORES_TSV: &str = "branch\tcity\nSTORE1\tMumbai\n";

pub(crate) const SALES_TSV: &str = "day\tsku\tchannel\tquantity\tdiscount\trevenue\n\
     2024-01-01\tSKU1\tSTORE1\t10\t0\t100\n\
     2024-01-02\tSKU2\tSTORE1\t5\t0\t50\n";

/// Uploads the master-data fixtures through the real pipeline.
pub(crate) async fn seed_master_data(state: &State) {
    use crate::service::{UploadKind, UploadOutcome};
    let pipeline = state.pipeline();
    for (kind, tsv) in [
        (UploadKind::Styles, STYLES_TSV),
        (UploadKind::Skus, SKUS_TSV),
        (UploadKind::Stores, STORES_TSV),
    ] {
        match pipeline.run(kind, tsv.as_bytes(), None).await.unwrap() {
            UploadOutcome::Done(response) => assert!(response.success, "{}", response.message),
            UploadOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }
}
