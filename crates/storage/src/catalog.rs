// SPDX-License-Identifier: MIT

//! The catalog repository (spec.md §4.G): a narrow, revision-guarded
//! interface over `ServiceRecord` rows, plus an in-process reference
//! implementation. The actual relational engine is out of scope (spec.md
//! §1); swapping in a real SQL-backed implementation means implementing
//! [`Catalog`] against it, nothing else in the workspace depends on the
//! concrete type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use zallet_core::{InstanceId, ServiceId, ServiceRecord, Status};

use crate::error::StorageError;

/// Filters accepted by [`Catalog::list`], mirroring the local endpoint's
/// `GET /ls?app=&global=&status=` (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Restrict to rows owned by this instance, unless `global` is set.
    pub instance_id: Option<InstanceId>,
    pub global: bool,
    pub app: Option<String>,
    pub status: Option<Status>,
}

/// Single-row mutations return whether exactly one row was affected, so
/// callers (Kill's revision-retry loop, reportStatus's revision guard) can
/// tell a no-op update from an error.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn insert(&self, record: ServiceRecord) -> Result<(), StorageError>;

    async fn get_by_id(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StorageError>;

    async fn get_by_id_and_instance(
        &self,
        id: &ServiceId,
        instance_id: &InstanceId,
    ) -> Result<Option<ServiceRecord>, StorageError>;

    async fn delete_by_id(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StorageError>;

    /// Accepts iff the stored row's revision is strictly less than
    /// `revision` (spec.md §4.F: `WHERE serviceId=? AND statusRevision<?`),
    /// i.e. iff `revision` is the new, larger value. Returns whether
    /// exactly one row was updated.
    async fn update_status(
        &self,
        id: &ServiceId,
        status: Status,
        revision: u64,
        err_log: Option<String>,
        event_time_ms: u64,
        pid: Option<u32>,
    ) -> Result<bool, StorageError>;

    /// Revision-guarded per spec.md §9's canonicalization of the probe vs.
    /// stat divergence: probe reports carry a revision, stat reports do
    /// not.
    async fn update_probe(
        &self,
        id: &ServiceId,
        event_time_ms: u64,
        is_success: bool,
        fail_count: u32,
        revision: u64,
    ) -> Result<bool, StorageError>;

    /// Not revision-guarded (spec.md §9): the latest sample always wins.
    async fn update_cpu_mem(
        &self,
        id: &ServiceId,
        cpu_percent: Option<f64>,
        mem_percent: Option<f64>,
    ) -> Result<bool, StorageError>;

    async fn list(&self, filter: &CatalogFilter) -> Result<Vec<ServiceRecord>, StorageError>;
}

/// `Arc<parking_lot::Mutex<HashMap<...>>>`-backed implementation, adequate
/// for the daemon running standalone on one host and for integration
/// tests (spec.md §5: "concurrency is delegated to the database" — here,
/// to the mutex).
#[derive(Clone, Default)]
pub struct InProcessCatalog {
    rows: Arc<Mutex<HashMap<ServiceId, ServiceRecord>>>,
}

impl InProcessCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for InProcessCatalog {
    async fn insert(&self, record: ServiceRecord) -> Result<(), StorageError> {
        self.rows.lock().insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_by_id(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StorageError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn get_by_id_and_instance(
        &self,
        id: &ServiceId,
        instance_id: &InstanceId,
    ) -> Result<Option<ServiceRecord>, StorageError> {
        Ok(self
            .rows
            .lock()
            .get(id)
            .filter(|row| row.instance_id.as_ref() == Some(instance_id))
            .cloned())
    }

    async fn delete_by_id(&self, id: &ServiceId) -> Result<Option<ServiceRecord>, StorageError> {
        Ok(self.rows.lock().remove(id))
    }

    async fn update_status(
        &self,
        id: &ServiceId,
        status: Status,
        revision: u64,
        err_log: Option<String>,
        event_time_ms: u64,
        pid: Option<u32>,
    ) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(id) else {
            return Ok(false);
        };
        if row.revision >= revision {
            return Ok(false);
        }
        row.status = status;
        row.revision = revision;
        if err_log.is_some() {
            row.err_log = err_log;
        }
        if pid.is_some() {
            row.pid = pid;
        }
        row.updated_at_ms = event_time_ms;
        Ok(true)
    }

    async fn update_probe(
        &self,
        id: &ServiceId,
        event_time_ms: u64,
        is_success: bool,
        fail_count: u32,
        revision: u64,
    ) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(id) else {
            return Ok(false);
        };
        if row.revision >= revision {
            return Ok(false);
        }
        // Only a successful probe advances the observed timestamp (spec.md
        // §4.F: "Probe updates overwrite probeTimestamp (only when
        // success)").
        if is_success {
            row.probe_timestamp_ms = Some(event_time_ms);
        }
        row.probe_fail_count = fail_count;
        row.revision = revision;
        row.updated_at_ms = event_time_ms;
        Ok(true)
    }

    async fn update_cpu_mem(
        &self,
        id: &ServiceId,
        cpu_percent: Option<f64>,
        mem_percent: Option<f64>,
    ) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(id) else {
            return Ok(false);
        };
        row.cpu_percent = cpu_percent;
        row.mem_percent = mem_percent;
        Ok(true)
    }

    async fn list(&self, filter: &CatalogFilter) -> Result<Vec<ServiceRecord>, StorageError> {
        let rows = self.rows.lock();
        let mut out: Vec<ServiceRecord> = rows
            .values()
            .filter(|row| {
                if !filter.global {
                    if let Some(instance_id) = &filter.instance_id {
                        if row.instance_id.as_ref() != Some(instance_id) {
                            return false;
                        }
                    }
                }
                if let Some(app) = &filter.app {
                    if &row.spec.app != app {
                        return false;
                    }
                }
                if let Some(status) = filter.status {
                    if row.status != status {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zallet_core::ServiceSpec;

    fn record(id: &str, instance: &str, revision: u64) -> ServiceRecord {
        ServiceRecord {
            id: ServiceId::from_string(id).unwrap_or_else(|_| ServiceId::generate_at(0, id)),
            spec: ServiceSpec::test_builder().build(),
            status: Status::Running,
            instance_id: InstanceId::from_string(instance.repeat(32).chars().take(32).collect::<String>()).ok(),
            pid: Some(100),
            agent_host: None,
            agent_token: None,
            err_log: None,
            probe_fail_count: 0,
            probe_timestamp_ms: None,
            cpu_percent: None,
            mem_percent: None,
            revision,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn update_status_rejects_non_increasing_revision() {
        let catalog = InProcessCatalog::new();
        let id = ServiceId::generate_at(0, "20260101000000");
        let mut row = record("x", "a", 5);
        row.id = id.clone();
        catalog.insert(row).await.unwrap();

        assert!(!catalog
            .update_status(&id, Status::Failed, 5, None, 1, None)
            .await
            .unwrap());
        assert!(!catalog
            .update_status(&id, Status::Failed, 4, None, 1, None)
            .await
            .unwrap());
        assert!(catalog
            .update_status(&id, Status::Failed, 6, None, 1, None)
            .await
            .unwrap());
        let updated = catalog.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(updated.revision, 6);
        assert_eq!(updated.status, Status::Failed);
    }

    #[tokio::test]
    async fn list_respects_instance_scoping_unless_global() {
        let catalog = InProcessCatalog::new();
        let id_a = ServiceId::generate_at(0, "20260101000001");
        let id_b = ServiceId::generate_at(0, "20260101000002");
        let mut a = record("a", "a", 1);
        a.id = id_a;
        let mut b = record("b", "b", 1);
        b.id = id_b;
        catalog.insert(a.clone()).await.unwrap();
        catalog.insert(b).await.unwrap();

        let scoped = CatalogFilter {
            instance_id: a.instance_id.clone(),
            global: false,
            app: None,
            status: None,
        };
        let rows = catalog.list(&scoped).await.unwrap();
        assert_eq!(rows.len(), 1);

        let global = CatalogFilter { global: true, ..Default::default() };
        let rows = catalog.list(&global).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let catalog = InProcessCatalog::new();
        let id = ServiceId::generate_at(0, "20260101000003");
        let mut row = record("c", "a", 1);
        row.id = id.clone();
        catalog.insert(row).await.unwrap();
        let deleted = catalog.delete_by_id(&id).await.unwrap();
        assert!(deleted.is_some());
        assert!(catalog.get_by_id(&id).await.unwrap().is_none());
    }
}
