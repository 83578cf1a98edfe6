//! In-memory twin of the postgres store. Backs the test suite and is handy
//! for local experiments; it honours every store contract, including the
//! monotonic cancellation flag and the clear-all ordering.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{Duration, NaiveDate, Utc};

use crate::service::{
    AlgorithmParameters, AuditEntry, NewAuditEntry, NewNoosResult, NewSaleRecord, NewSku, NewStore,
    NewStyle, NoosResult, RetailStore, SaleRecord, Sku, Store, StoreError, Style,
    tasks::{NewTask, Task, TaskCounts, TaskId, TaskKind, TaskKindStats, TaskStatus, TaskStore},
};

#[derive(Debug, Default)]
struct Inner {
    tasks: BTreeMap<i64, Task>,
    next_task_id: i64,
    styles: BTreeMap<i64, Style>,
    next_style_id: i64,
    skus: BTreeMap<i64, Sku>,
    next_sku_id: i64,
    stores: BTreeMap<i64, Store>,
    next_store_id: i64,
    sales: BTreeMap<i64, SaleRecord>,
    next_sale_id: i64,
    noos: BTreeMap<i64, NoosResult>,
    next_noos_id: i64,
    params: BTreeMap<String, AlgorithmParameters>,
    audit: Vec<AuditEntry>,
    next_audit_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Conflict("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Conflict("memory store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut inner = self.write()?;
        inner.next_task_id += 1;
        let now = Utc::now();
        let task = Task {
            id: TaskId::from(inner.next_task_id),
            kind: task.kind,
            status: TaskStatus::Pending,
            progress: 0.0,
            phase: None,
            message: None,
            file_name: task.file_name,
            total_records: None,
            processed_records: None,
            error_count: 0,
            error_message: None,
            result_path: None,
            cancellation_requested: false,
            parameters: task.parameters,
            created_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
        };
        inner.tasks.insert(*task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let Some(current) = inner.tasks.get_mut(&*task.id) else {
            return Err(StoreError::not_found("task", task.id.to_string()));
        };
        let mut task = task.clone();
        // The flag is monotonic: an external cancellation must survive a
        // concurrent full-row write from the owning worker.
        task.cancellation_requested |= current.cancellation_requested;
        *current = task;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.read()?.tasks.get(&*id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .read()?
            .tasks
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_by_status(
        &self,
        status: TaskStatus,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .read()?
            .tasks
            .values()
            .rev()
            .filter(|t| t.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_by_status(&self) -> Result<TaskCounts, StoreError> {
        let inner = self.read()?;
        let mut counts = TaskCounts::default();
        for task in inner.tasks.values() {
            counts.total += 1;
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }

    async fn request_cancellation(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let mut inner = self.write()?;
        let Some(task) = inner.tasks.get_mut(&*id) else {
            return Ok(None);
        };
        if !task.status.is_terminal() {
            task.cancellation_requested = true;
            task.updated_at = Utc::now();
        }
        Ok(Some(task.clone()))
    }

    async fn stats_by_kind_since(
        &self,
        kind: TaskKind,
        days: i64,
    ) -> Result<TaskKindStats, StoreError> {
        let since = Utc::now() - Duration::days(days);
        let inner = self.read()?;
        let mut stats = TaskKindStats::default();
        for task in inner
            .tasks
            .values()
            .filter(|t| t.kind == kind && t.created_at >= since)
        {
            stats.total += 1;
            match task.status {
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[async_trait::async_trait]
impl RetailStore for MemoryStore {
    async fn list_styles(&self) -> Result<Vec<Style>, StoreError> {
        Ok(self.read()?.styles.values().cloned().collect())
    }

    async fn find_styles_by_codes(&self, codes: &[String]) -> Result<Vec<Style>, StoreError> {
        let wanted: HashSet<&str> = codes.iter().map(String::as_str).collect();
        Ok(self
            .read()?
            .styles
            .values()
            .filter(|s| wanted.contains(s.style_code.as_str()))
            .cloned()
            .collect())
    }

    async fn apply_style_batch(
        &self,
        inserts: Vec<NewStyle>,
        updates: Vec<Style>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        for update in updates {
            let Some(current) = inner.styles.get_mut(&update.id) else {
                return Err(StoreError::not_found("style", update.id.to_string()));
            };
            *current = update;
        }
        for insert in inserts {
            inner.next_style_id += 1;
            let id = inner.next_style_id;
            inner.styles.insert(
                id,
                Style {
                    id,
                    style_code: insert.style_code,
                    brand: insert.brand,
                    category: insert.category,
                    sub_category: insert.sub_category,
                    mrp: insert.mrp,
                    gender: insert.gender,
                },
            );
        }
        Ok(())
    }

    async fn list_skus(&self) -> Result<Vec<Sku>, StoreError> {
        Ok(self.read()?.skus.values().cloned().collect())
    }

    async fn find_skus_by_codes(&self, codes: &[String]) -> Result<Vec<Sku>, StoreError> {
        let wanted: HashSet<&str> = codes.iter().map(String::as_str).collect();
        Ok(self
            .read()?
            .skus
            .values()
            .filter(|s| wanted.contains(s.sku.as_str()))
            .cloned()
            .collect())
    }

    async fn apply_sku_batch(
        &self,
        inserts: Vec<NewSku>,
        updates: Vec<Sku>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        for update in updates {
            let Some(current) = inner.skus.get_mut(&update.id) else {
                return Err(StoreError::not_found("sku", update.id.to_string()));
            };
            *current = update;
        }
        for insert in inserts {
            inner.next_sku_id += 1;
            let id = inner.next_sku_id;
            inner.skus.insert(
                id,
                Sku {
                    id,
                    sku: insert.sku,
                    style_id: insert.style_id,
                    size: insert.size,
                },
            );
        }
        Ok(())
    }

    async fn list_stores(&self) -> Result<Vec<Store>, StoreError> {
        Ok(self.read()?.stores.values().cloned().collect())
    }

    async fn find_stores_by_branches(&self, branches: &[String]) -> Result<Vec<Store>, StoreError> {
        let wanted: HashSet<&str> = branches.iter().map(String::as_str).collect();
        Ok(self
            .read()?
            .stores
            .values()
            .filter(|s| wanted.contains(s.branch.as_str()))
            .cloned()
            .collect())
    }

    async fn apply_store_batch(
        &self,
        inserts: Vec<NewStore>,
        updates: Vec<Store>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        for update in updates {
            let Some(current) = inner.stores.get_mut(&update.id) else {
                return Err(StoreError::not_found("store", update.id.to_string()));
            };
            *current = update;
        }
        for insert in inserts {
            inner.next_store_id += 1;
            let id = inner.next_store_id;
            inner.stores.insert(
                id,
                Store {
                    id,
                    branch: insert.branch,
                    city: insert.city,
                },
            );
        }
        Ok(())
    }

    async fn list_sales(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<SaleRecord>, StoreError> {
        Ok(self
            .read()?
            .sales
            .values()
            .filter(|s| range.is_none_or(|(start, end)| s.day >= start && s.day <= end))
            .cloned()
            .collect())
    }

    async fn count_sales(&self) -> Result<i64, StoreError> {
        Ok(self.read()?.sales.len() as i64)
    }

    async fn replace_sales(&self, rows: Vec<NewSaleRecord>) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        inner.sales.clear();
        inner.next_sale_id = 0;
        let inserted = rows.len() as u64;
        for row in rows {
            inner.next_sale_id += 1;
            let id = inner.next_sale_id;
            inner.sales.insert(
                id,
                SaleRecord {
                    id,
                    day: row.day,
                    sku_id: row.sku_id,
                    store_id: row.store_id,
                    quantity: row.quantity,
                    discount: row.discount,
                    revenue: row.revenue,
                },
            );
        }
        Ok(inserted)
    }

    async fn replace_noos_results(&self, rows: Vec<NewNoosResult>) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        inner.noos.clear();
        let inserted = rows.len() as u64;
        for row in rows {
            inner.next_noos_id += 1;
            let id = inner.next_noos_id;
            inner.noos.insert(
                id,
                NoosResult {
                    id,
                    algorithm_run_id: row.algorithm_run_id,
                    category: row.category,
                    style_code: row.style_code,
                    style_ros: row.style_ros,
                    r#type: row.r#type,
                    style_rev_contribution: row.style_rev_contribution,
                    total_quantity_sold: row.total_quantity_sold,
                    total_revenue: row.total_revenue,
                    days_available: row.days_available,
                    days_with_sales: row.days_with_sales,
                    avg_discount: row.avg_discount,
                    calculated_at: row.calculated_at,
                },
            );
        }
        Ok(inserted)
    }

    async fn list_noos_results(&self, run_id: Option<i64>) -> Result<Vec<NoosResult>, StoreError> {
        Ok(self
            .read()?
            .noos
            .values()
            .filter(|r| run_id.is_none_or(|id| r.algorithm_run_id == id))
            .cloned()
            .collect())
    }

    async fn latest_noos_run_id(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .read()?
            .noos
            .values()
            .map(|r| r.algorithm_run_id)
            .max())
    }

    async fn recent_noos_run_ids(&self, limit: usize) -> Result<Vec<i64>, StoreError> {
        let mut ids: Vec<i64> = self
            .read()?
            .noos
            .values()
            .map(|r| r.algorithm_run_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);
        Ok(ids)
    }

    async fn get_parameters(&self, name: &str) -> Result<Option<AlgorithmParameters>, StoreError> {
        Ok(self.read()?.params.get(name).cloned())
    }

    async fn list_parameters(&self) -> Result<Vec<AlgorithmParameters>, StoreError> {
        Ok(self.read()?.params.values().cloned().collect())
    }

    async fn upsert_parameters(
        &self,
        params: AlgorithmParameters,
    ) -> Result<AlgorithmParameters, StoreError> {
        let mut inner = self.write()?;
        let mut params = params;
        params.updated_at = Utc::now();
        if let Some(existing) = inner.params.get(&params.parameter_set) {
            params.created_at = existing.created_at;
        }
        inner
            .params
            .insert(params.parameter_set.clone(), params.clone());
        Ok(params)
    }

    async fn activate_parameters(&self, name: &str) -> Result<AlgorithmParameters, StoreError> {
        let mut inner = self.write()?;
        if !inner.params.contains_key(name) {
            return Err(StoreError::not_found("parameter set", name));
        }
        let now = Utc::now();
        let mut activated = None;
        for params in inner.params.values_mut() {
            let active = params.parameter_set == name;
            if params.is_active != active {
                params.is_active = active;
                params.updated_at = now;
            }
            if active {
                activated = Some(params.clone());
            }
        }
        activated.ok_or_else(|| StoreError::not_found("parameter set", name))
    }

    async fn active_parameters(&self) -> Result<Option<AlgorithmParameters>, StoreError> {
        Ok(self
            .read()?
            .params
            .values()
            .find(|p| p.is_active)
            .cloned())
    }

    async fn record_audit(&self, entries: Vec<NewAuditEntry>) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let now = Utc::now();
        for entry in entries {
            inner.next_audit_id += 1;
            let id = inner.next_audit_id;
            inner.audit.push(AuditEntry {
                id,
                logged_at: now,
                entity_type: entry.entity_type,
                entity_id: entry.entity_id,
                action: entry.action,
                details: entry.details,
                modified_by: entry.modified_by,
            });
        }
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .read()?
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        // Foreign-key-safe order, identity counters reset.
        inner.sales.clear();
        inner.next_sale_id = 0;
        inner.skus.clear();
        inner.next_sku_id = 0;
        inner.styles.clear();
        inner.next_style_id = 0;
        inner.stores.clear();
        inner.next_store_id = 0;
        inner.tasks.clear();
        inner.next_task_id = 0;
        inner.noos.clear();
        inner.next_noos_id = 0;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_task_ids_are_monotonic() {
        let store = MemoryStore::new();
        let a = store
            .create(NewTask::builder().kind(TaskKind::StylesUpload).build())
            .await
            .unwrap();
        let b = store
            .create(NewTask::builder().kind(TaskKind::SalesUpload).build())
            .await
            .unwrap();
        assert!(*b.id > *a.id);
    }

    #[tokio::test]
    async fn test_update_keeps_cancellation_flag_monotonic() {
        let store = MemoryStore::new();
        let task = store
            .create(NewTask::builder().kind(TaskKind::AlgorithmRun).build())
            .await
            .unwrap();
        store.request_cancellation(task.id).await.unwrap();

        // A stale full-row write from the worker must not clear the flag.
        let mut stale = task.clone();
        stale.progress = 40.0;
        assert!(!stale.cancellation_requested);
        store.update(&stale).await.unwrap();

        let current = store.get(task.id).await.unwrap().unwrap();
        assert!(current.cancellation_requested);
        assert_eq!(current.progress, 40.0);
    }

    #[tokio::test]
    async fn test_cancellation_is_noop_on_terminal_tasks() {
        let store = MemoryStore::new();
        let mut task = store
            .create(NewTask::builder().kind(TaskKind::AlgorithmRun).build())
            .await
            .unwrap();
        task.status = TaskStatus::Completed;
        task.progress = 100.0;
        store.update(&task).await.unwrap();

        let after = store
            .request_cancellation(task.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!after.cancellation_requested);
    }

    #[tokio::test]
    async fn test_created_task_is_readable_from_another_handle() {
        let store = Arc::new(MemoryStore::new());
        let task = store
            .create(NewTask::builder().kind(TaskKind::NoosDownload).build())
            .await
            .unwrap();
        let reader = store.clone();
        let seen = tokio::spawn(async move { reader.get(task.id).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.unwrap().id, task.id);
    }

    #[tokio::test]
    async fn test_clear_all_resets_identity() {
        let store = MemoryStore::new();
        store
            .create(NewTask::builder().kind(TaskKind::StylesUpload).build())
            .await
            .unwrap();
        store
            .apply_style_batch(
                vec![NewStyle {
                    style_code: "STY1".into(),
                    brand: "Acme".into(),
                    category: "Shirts".into(),
                    sub_category: "Casual".into(),
                    mrp: rust_decimal::Decimal::from(100),
                    gender: "Men".into(),
                }],
                vec![],
            )
            .await
            .unwrap();
        store.clear_all().await.unwrap();
        assert!(TaskStore::get(&store, TaskId::from(1)).await.unwrap().is_none());
        assert!(store.list_styles().await.unwrap().is_empty());

        let task = store
            .create(NewTask::builder().kind(TaskKind::StylesUpload).build())
            .await
            .unwrap();
        assert_eq!(*task.id, 1);
    }
}
