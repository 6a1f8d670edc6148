//! Transfer Records
//!
//! The persistent entity describing one ingest or download. Whether a
//! record is an ingest or a download is a data value, not a type: the
//! preparation pipeline and the finalize cycles branch on [`TransferKind`]
//! and interpret the raw status id through the matching code set.

use super::context::SecurityContext;
use super::status::{DownloadStatus, IngestStatus, TransferStatus};

/// Persisted error messages are clipped to fit column constraints.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 255;

/// Sentinel for "no explicit expiry set".
pub const EXPIRY_UNSET: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Ingest,
    Download,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Ingest => "INGEST",
            TransferKind::Download => "DOWNLOAD",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "INGEST" => Some(TransferKind::Ingest),
            "DOWNLOAD" => Some(TransferKind::Download),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One staged transfer, ingest or download.
///
/// The store owns the authoritative copy; long-running operations must
/// re-fetch instead of branching on a cached status.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    /// Store-assigned numeric id, 0 until the record is created.
    pub id: i64,
    pub kind: TransferKind,
    pub(crate) transfer_id: Option<String>,
    /// Id of the digital object this transfer belongs to.
    pub object_id: String,
    pub owner_id: String,
    pub group_id: String,
    /// Raw status id, interpreted through the code set matching `kind`.
    pub status: i32,
    /// Epoch millis of the last mutation.
    pub last_update: i64,
    /// Epoch millis, or [`EXPIRY_UNSET`].
    pub expires_at: i64,
    /// Base of the prepared cache folder, authoritative for the data,
    /// settings and generated sub-folders.
    pub staging_url: Option<String>,
    /// Externally reachable URL handed to the mover, if one was prepared.
    pub client_access_url: Option<String>,
    /// Final location inside the permanent store, set by the archiver.
    pub storage_url: Option<String>,
    pub access_point_id: Option<String>,
    pub(crate) error_message: Option<String>,
}

impl TransferRecord {
    fn new(kind: TransferKind, status: i32, object_id: String, ctx: &SecurityContext) -> Self {
        Self {
            id: 0,
            kind,
            transfer_id: None,
            object_id,
            owner_id: ctx.principal_id.clone(),
            group_id: ctx.group_id.clone(),
            status,
            last_update: EXPIRY_UNSET,
            expires_at: EXPIRY_UNSET,
            staging_url: None,
            client_access_url: None,
            storage_url: None,
            access_point_id: None,
            error_message: None,
        }
    }

    /// New ingest, immediately in preparation.
    pub fn ingest(object_id: impl Into<String>, ctx: &SecurityContext) -> Self {
        Self::new(TransferKind::Ingest, IngestStatus::Preparing.id(), object_id.into(), ctx)
    }

    /// New download, scheduled for the next finalize cycle.
    pub fn download(object_id: impl Into<String>, ctx: &SecurityContext) -> Self {
        Self::new(TransferKind::Download, DownloadStatus::Scheduled.id(), object_id.into(), ctx)
    }

    /// The string transfer id, defaulting to the stringified numeric id.
    pub fn transfer_id(&self) -> String {
        self.transfer_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn set_transfer_id(&mut self, transfer_id: impl Into<String>) {
        self.transfer_id = Some(transfer_id.into());
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Set the human-readable error text, clipped to the persistable length.
    /// Repeated failures overwrite the previous message.
    pub fn set_error_message(&mut self, message: Option<&str>) {
        self.error_message = message.map(clip_message);
    }

    pub fn ingest_status(&self) -> IngestStatus {
        IngestStatus::from_id(self.status)
    }

    pub fn download_status(&self) -> DownloadStatus {
        DownloadStatus::from_id(self.status)
    }

    pub fn is_final(&self) -> bool {
        match self.kind {
            TransferKind::Ingest => self.ingest_status().is_final(),
            TransferKind::Download => self.download_status().is_final(),
        }
    }

    pub fn is_error(&self) -> bool {
        match self.kind {
            TransferKind::Ingest => self.ingest_status().is_error(),
            TransferKind::Download => self.download_status().is_error(),
        }
    }

    pub fn is_interactive(&self) -> bool {
        match self.kind {
            TransferKind::Ingest => self.ingest_status().is_interactive(),
            TransferKind::Download => self.download_status().is_interactive(),
        }
    }

    /// The removed code of the record's own kind.
    pub fn removed_status_id(&self) -> i32 {
        match self.kind {
            TransferKind::Ingest => IngestStatus::Removed.id(),
            TransferKind::Download => DownloadStatus::Removed.id(),
        }
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.last_update = now_ms;
    }

    /// Whether the record is overdue at `now_ms`. With an explicit expiry
    /// the deadline is `expires_at`; without one it is `last_update` plus
    /// the configured default lifetime.
    pub fn is_expired(&self, now_ms: i64, default_lifetime_ms: i64) -> bool {
        if self.expires_at != EXPIRY_UNSET {
            now_ms > self.expires_at
        } else {
            now_ms > self.last_update + default_lifetime_ms
        }
    }
}

pub(crate) fn clip_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message.to_string();
    }
    let clipped: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS - 3).collect();
    format!("{clipped}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::context::Role;

    fn ctx() -> SecurityContext {
        SecurityContext::new("alice", "geo", Role::Member)
    }

    #[test]
    fn constructors_set_initial_status() {
        let ingest = TransferRecord::ingest("obj-1", &ctx());
        assert_eq!(ingest.kind, TransferKind::Ingest);
        assert_eq!(ingest.ingest_status(), IngestStatus::Preparing);
        assert_eq!(ingest.owner_id, "alice");
        assert_eq!(ingest.group_id, "geo");

        let download = TransferRecord::download("obj-1", &ctx());
        assert_eq!(download.download_status(), DownloadStatus::Scheduled);
    }

    #[test]
    fn transfer_id_defaults_to_numeric_id() {
        let mut record = TransferRecord::ingest("obj-1", &ctx());
        record.id = 4711;
        assert_eq!(record.transfer_id(), "4711");

        record.set_transfer_id("ingest-4711");
        assert_eq!(record.transfer_id(), "ingest-4711");
    }

    #[test]
    fn error_message_is_clipped() {
        let mut record = TransferRecord::download("obj-1", &ctx());
        record.set_error_message(Some("disk full"));
        assert_eq!(record.error_message(), Some("disk full"));

        let long = "x".repeat(400);
        record.set_error_message(Some(&long));
        let stored = record.error_message().unwrap();
        assert_eq!(stored.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert!(stored.ends_with("..."));

        record.set_error_message(None);
        assert_eq!(record.error_message(), None);
    }

    #[test]
    fn expiry_with_explicit_deadline() {
        let mut record = TransferRecord::ingest("obj-1", &ctx());
        record.touch(1_000);
        record.expires_at = 5_000;
        assert!(!record.is_expired(5_000, 100));
        assert!(record.is_expired(5_001, 100));
    }

    #[test]
    fn expiry_falls_back_to_default_lifetime() {
        let mut record = TransferRecord::ingest("obj-1", &ctx());
        record.touch(1_000);
        assert!(!record.is_expired(1_500, 1_000));
        assert!(!record.is_expired(2_000, 1_000));
        assert!(record.is_expired(2_001, 1_000));
    }
}
