//! Transfer Record Store
//!
//! CRUD/status-update boundary for transfer records. The staging subsystem
//! owns record *lifecycle*, the store owns the authoritative copy; every
//! call is scoped by the opaque security context of the caller, which the
//! implementations forward without interpreting.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use super::context::SecurityContext;
use super::record::{TransferKind, TransferRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transfer record {0} not found")]
    NotFound(i64),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Persistence operations required by the staging subsystem.
///
/// Every mutation stamps `last_update` with the caller-provided timestamp
/// so expiry math stays consistent with the caller's clock.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a new record and assign its numeric id.
    async fn create(
        &self,
        record: TransferRecord,
        now_ms: i64,
        ctx: &SecurityContext,
    ) -> Result<TransferRecord, StoreError>;

    async fn find(
        &self,
        kind: TransferKind,
        id: i64,
        ctx: &SecurityContext,
    ) -> Result<Option<TransferRecord>, StoreError>;

    /// Replace status and error message. The message overwrites any earlier
    /// one and is clipped to the persistable length.
    async fn update_status(
        &self,
        kind: TransferKind,
        id: i64,
        status: i32,
        message: Option<&str>,
        now_ms: i64,
        ctx: &SecurityContext,
    ) -> Result<(), StoreError>;

    async fn update_staging_url(
        &self,
        kind: TransferKind,
        id: i64,
        url: &str,
        now_ms: i64,
        ctx: &SecurityContext,
    ) -> Result<(), StoreError>;

    async fn update_client_access_url(
        &self,
        kind: TransferKind,
        id: i64,
        url: &str,
        now_ms: i64,
        ctx: &SecurityContext,
    ) -> Result<(), StoreError>;

    /// All records whose status matches any bit of `status_mask`
    /// (a mask of 0 matches only records still at the unknown status),
    /// optionally restricted to one owner.
    async fn list_by_status(
        &self,
        kind: TransferKind,
        status_mask: i32,
        owner: Option<&str>,
        ctx: &SecurityContext,
    ) -> Result<Vec<TransferRecord>, StoreError>;

    async fn delete(
        &self,
        kind: TransferKind,
        id: i64,
        ctx: &SecurityContext,
    ) -> Result<(), StoreError>;
}

/// Mask predicate shared by the store implementations.
pub(crate) fn mask_matches(status: i32, mask: i32) -> bool {
    if mask == 0 {
        return status == 0;
    }
    (status & mask) != 0
}
