//! In-process transfer record store.
//!
//! Default backend for tests and single-process runs; the SQLite store is
//! the durable option.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{StoreError, TransferStore, mask_matches};
use crate::staging::context::SecurityContext;
use crate::staging::record::{TransferKind, TransferRecord};

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: HashMap<(TransferKind, i64), TransferRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn create(
        &self,
        mut record: TransferRecord,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<TransferRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        record.id = inner.next_id;
        record.touch(now_ms);
        inner
            .records
            .insert((record.kind, record.id), record.clone());
        Ok(record)
    }

    async fn find(
        &self,
        kind: TransferKind,
        id: i64,
        _ctx: &SecurityContext,
    ) -> Result<Option<TransferRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.get(&(kind, id)).cloned())
    }

    async fn update_status(
        &self,
        kind: TransferKind,
        id: i64,
        status: i32,
        message: Option<&str>,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&(kind, id))
            .ok_or(StoreError::NotFound(id))?;
        record.status = status;
        record.set_error_message(message);
        record.touch(now_ms);
        Ok(())
    }

    async fn update_staging_url(
        &self,
        kind: TransferKind,
        id: i64,
        url: &str,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&(kind, id))
            .ok_or(StoreError::NotFound(id))?;
        record.staging_url = Some(url.to_string());
        record.touch(now_ms);
        Ok(())
    }

    async fn update_client_access_url(
        &self,
        kind: TransferKind,
        id: i64,
        url: &str,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&(kind, id))
            .ok_or(StoreError::NotFound(id))?;
        record.client_access_url = Some(url.to_string());
        record.touch(now_ms);
        Ok(())
    }

    async fn list_by_status(
        &self,
        kind: TransferKind,
        status_mask: i32,
        owner: Option<&str>,
        _ctx: &SecurityContext,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut matches: Vec<TransferRecord> = inner
            .records
            .values()
            .filter(|r| r.kind == kind)
            .filter(|r| mask_matches(r.status, status_mask))
            .filter(|r| owner.is_none_or(|o| r.owner_id == o))
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.id);
        Ok(matches)
    }

    async fn delete(
        &self,
        kind: TransferKind,
        id: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .records
            .remove(&(kind, id))
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
