//! Transfer Status Codes
//!
//! Each code carries a distinct power-of-two id so several codes can be
//! OR-combined into a single query mask for the record store. The bitwise
//! helpers live as free functions, the enums stay pure data.

/// Common predicate surface of ingest and download status codes.
pub trait TransferStatus: Copy + PartialEq {
    /// Numeric id used for persistence and query masks.
    fn id(&self) -> i32;

    /// Decode a stored id. Unmapped values decode to the `Unknown` member.
    fn from_id(id: i32) -> Self;

    /// No further automatic transition will happen.
    fn is_final(&self) -> bool;

    /// Operator attention is required.
    fn is_error(&self) -> bool;

    /// A user may access the staged data right now.
    fn is_interactive(&self) -> bool;

    /// A periodic finalize cycle may act on records in this status.
    fn is_finalizable(&self) -> bool;
}

/// Lifecycle of an upload into the permanent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestStatus {
    Unknown,
    /// Cache folder is being prepared.
    Preparing,
    PreparationFailed,
    /// Upload folder is ready, the client may start uploading.
    UploadScheduled,
    UploadRunning,
    UploadFinished,
    UploadFailed,
    /// Data is being moved from the cache into the permanent store.
    ArchiveRunning,
    ArchiveFinished,
    ArchiveFailed,
    /// Logically removed, physical cleanup happens in the next cycle.
    Removed,
}

impl TransferStatus for IngestStatus {
    fn id(&self) -> i32 {
        match self {
            IngestStatus::Unknown => 0,
            IngestStatus::Preparing => 1,
            IngestStatus::PreparationFailed => 2,
            IngestStatus::UploadScheduled => 4,
            IngestStatus::UploadRunning => 8,
            IngestStatus::UploadFinished => 16,
            IngestStatus::UploadFailed => 32,
            IngestStatus::ArchiveRunning => 64,
            IngestStatus::ArchiveFinished => 128,
            IngestStatus::ArchiveFailed => 256,
            IngestStatus::Removed => 512,
        }
    }

    fn from_id(id: i32) -> Self {
        match id {
            1 => IngestStatus::Preparing,
            2 => IngestStatus::PreparationFailed,
            4 => IngestStatus::UploadScheduled,
            8 => IngestStatus::UploadRunning,
            16 => IngestStatus::UploadFinished,
            32 => IngestStatus::UploadFailed,
            64 => IngestStatus::ArchiveRunning,
            128 => IngestStatus::ArchiveFinished,
            256 => IngestStatus::ArchiveFailed,
            512 => IngestStatus::Removed,
            _ => IngestStatus::Unknown,
        }
    }

    fn is_final(&self) -> bool {
        matches!(self, IngestStatus::ArchiveFinished | IngestStatus::Removed)
    }

    fn is_error(&self) -> bool {
        matches!(
            self,
            IngestStatus::PreparationFailed | IngestStatus::UploadFailed | IngestStatus::ArchiveFailed
        )
    }

    fn is_interactive(&self) -> bool {
        matches!(self, IngestStatus::UploadScheduled)
    }

    fn is_finalizable(&self) -> bool {
        matches!(
            self,
            IngestStatus::UploadScheduled | IngestStatus::UploadRunning | IngestStatus::UploadFinished
        )
    }
}

/// Lifecycle of a transfer out of the permanent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    Unknown,
    Scheduled,
    Preparing,
    PreparationFailed,
    /// Staged data is in place, the client may fetch it.
    Ready,
    Removed,
}

impl TransferStatus for DownloadStatus {
    fn id(&self) -> i32 {
        match self {
            DownloadStatus::Unknown => 0,
            DownloadStatus::Scheduled => 1,
            DownloadStatus::Preparing => 2,
            DownloadStatus::PreparationFailed => 4,
            DownloadStatus::Ready => 8,
            DownloadStatus::Removed => 16,
        }
    }

    fn from_id(id: i32) -> Self {
        match id {
            1 => DownloadStatus::Scheduled,
            2 => DownloadStatus::Preparing,
            4 => DownloadStatus::PreparationFailed,
            8 => DownloadStatus::Ready,
            16 => DownloadStatus::Removed,
            _ => DownloadStatus::Unknown,
        }
    }

    fn is_final(&self) -> bool {
        matches!(self, DownloadStatus::Removed)
    }

    fn is_error(&self) -> bool {
        matches!(self, DownloadStatus::PreparationFailed)
    }

    fn is_interactive(&self) -> bool {
        matches!(self, DownloadStatus::Ready)
    }

    fn is_finalizable(&self) -> bool {
        matches!(self, DownloadStatus::Scheduled)
    }
}

/// OR the ids of several codes into one query mask.
pub fn combine<S: TransferStatus>(codes: &[S]) -> i32 {
    codes.iter().fold(0, |mask, code| mask | code.id())
}

/// Check whether `code` is set inside a combined `value`. The `Unknown`
/// member (id 0) matches only a value of exactly zero.
pub fn has_status<S: TransferStatus>(value: i32, code: S) -> bool {
    if code.id() == 0 {
        return value == 0;
    }
    (value & code.id()) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_id_roundtrip() {
        let all = [
            IngestStatus::Unknown,
            IngestStatus::Preparing,
            IngestStatus::PreparationFailed,
            IngestStatus::UploadScheduled,
            IngestStatus::UploadRunning,
            IngestStatus::UploadFinished,
            IngestStatus::UploadFailed,
            IngestStatus::ArchiveRunning,
            IngestStatus::ArchiveFinished,
            IngestStatus::ArchiveFailed,
            IngestStatus::Removed,
        ];
        for status in all {
            assert_eq!(IngestStatus::from_id(status.id()), status);
        }
    }

    #[test]
    fn download_id_roundtrip() {
        let all = [
            DownloadStatus::Unknown,
            DownloadStatus::Scheduled,
            DownloadStatus::Preparing,
            DownloadStatus::PreparationFailed,
            DownloadStatus::Ready,
            DownloadStatus::Removed,
        ];
        for status in all {
            assert_eq!(DownloadStatus::from_id(status.id()), status);
        }
    }

    #[test]
    fn unmapped_ids_decode_to_unknown() {
        assert_eq!(IngestStatus::from_id(-1), IngestStatus::Unknown);
        assert_eq!(IngestStatus::from_id(3), IngestStatus::Unknown);
        assert_eq!(IngestStatus::from_id(1024), IngestStatus::Unknown);
        assert_eq!(DownloadStatus::from_id(-1), DownloadStatus::Unknown);
        assert_eq!(DownloadStatus::from_id(99), DownloadStatus::Unknown);
    }

    #[test]
    fn combine_and_has_status() {
        let mask = combine(&[DownloadStatus::Ready, DownloadStatus::Removed]);
        assert_eq!(mask, 8 | 16);
        assert!(has_status(mask, DownloadStatus::Ready));
        assert!(has_status(mask, DownloadStatus::Removed));
        assert!(!has_status(mask, DownloadStatus::Scheduled));
        assert!(!has_status(mask, DownloadStatus::PreparationFailed));
    }

    #[test]
    fn unknown_matches_only_zero() {
        assert!(has_status(0, IngestStatus::Unknown));
        assert!(!has_status(1, IngestStatus::Unknown));
        assert!(!has_status(
            combine(&[IngestStatus::Preparing, IngestStatus::Removed]),
            IngestStatus::Unknown
        ));
    }

    #[test]
    fn ingest_predicates() {
        assert!(IngestStatus::ArchiveFinished.is_final());
        assert!(IngestStatus::Removed.is_final());
        assert!(!IngestStatus::UploadRunning.is_final());

        assert!(IngestStatus::PreparationFailed.is_error());
        assert!(IngestStatus::UploadFailed.is_error());
        assert!(IngestStatus::ArchiveFailed.is_error());
        assert!(!IngestStatus::UploadFinished.is_error());

        assert!(IngestStatus::UploadScheduled.is_interactive());
        assert!(!IngestStatus::ArchiveRunning.is_interactive());

        assert!(IngestStatus::UploadFinished.is_finalizable());
        assert!(!IngestStatus::Removed.is_finalizable());
    }

    #[test]
    fn download_predicates() {
        assert!(DownloadStatus::Removed.is_final());
        assert!(!DownloadStatus::Ready.is_final());
        assert!(DownloadStatus::PreparationFailed.is_error());
        assert!(DownloadStatus::Ready.is_interactive());
        assert!(DownloadStatus::Scheduled.is_finalizable());
        assert!(!DownloadStatus::Ready.is_finalizable());
    }
}
